//! Executions queue
//!
//! One job per concrete tool invocation. When a job's declared dependencies
//! have all finished, the consumer collects their cached findings, re-runs
//! the execution combinator against them, and — when the findings fan out
//! into more argument combinations than the one in-flight job can carry —
//! spawns additional executions at the front of the queue and rewires every
//! deferred dependent so downstream stages wait for the whole fan-out.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use scanforge_core::domain::{CommandBuilder, Finding, InputPools};

use crate::application::combinator::calculate_executions;
use crate::application::lifecycle::{ExecutionLifecycle, LifecycleError, TaskLifecycle};
use crate::domain::entities::Execution;
use crate::domain::services::{FindingsPipeline, OutputParser, ToolRunner};
use crate::domain::value_objects::Status;
use crate::infrastructure::queue::{JobHandler, JobId, JobQueue, JobState};
use crate::infrastructure::stores::{ExecutionStore, StoreError, TaskStore};

/// Message stored with every executions-queue job. The pools double as the
/// metadata needed to re-enqueue the job during dependency rewiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMessage {
    pub execution: Execution,
    pub pools: InputPools,
}

/// Cached result of an executions-queue job, read by dependent jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub status: Status,
    pub findings: Vec<Finding>,
}

/// Errors internal to the executions consumer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Handle to the executions queue.
#[derive(Clone)]
pub struct ExecutionsQueue {
    inner: Arc<ExecutionsInner>,
}

impl ExecutionsQueue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        result_ttl: std::time::Duration,
        reports_dir: PathBuf,
        tasks: Arc<dyn TaskStore>,
        executions: Arc<dyn ExecutionStore>,
        runner: Arc<dyn ToolRunner>,
        parser: Arc<dyn OutputParser>,
        pipeline: Arc<dyn FindingsPipeline>,
    ) -> Self {
        let execution_lifecycle = ExecutionLifecycle::new(executions.clone());
        let task_lifecycle = TaskLifecycle::new(tasks.clone());
        Self {
            inner: Arc::new(ExecutionsInner {
                queue: Arc::new(JobQueue::new("executions", result_ttl)),
                tasks,
                executions,
                runner,
                parser,
                pipeline,
                execution_lifecycle,
                task_lifecycle,
                reports_dir,
            }),
        }
    }

    /// Spawn the worker pool consuming this queue.
    pub fn start_workers(&self, concurrency: usize) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.inner.queue).spawn_worker_pool(self.inner.clone(), None, concurrency)
    }

    /// Enqueue an execution with its pools and dependency job ids.
    pub async fn enqueue(
        &self,
        execution: Execution,
        pools: InputPools,
        dependencies: Vec<JobId>,
        at_front: bool,
    ) -> Result<JobId, StoreError> {
        self.inner
            .enqueue(execution, pools, dependencies, at_front)
            .await
    }

    pub async fn fetch_outcome(&self, job_id: JobId) -> Option<ExecutionOutcome> {
        self.inner.queue.fetch_result(job_id).await
    }

    pub async fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.inner.queue.job_state(job_id).await
    }

    pub async fn job_dependencies(&self, job_id: JobId) -> Vec<JobId> {
        self.inner.queue.job_dependencies(job_id).await
    }

    pub async fn deferred_job_ids(&self) -> Vec<JobId> {
        self.inner.queue.deferred_job_ids().await
    }

    /// Cancel a job that has not started yet.
    pub async fn cancel_job(&self, job_id: JobId) -> bool {
        self.inner.queue.cancel_job(job_id).await
    }

    /// Send the cooperative stop signal to a running job.
    pub async fn stop_job(&self, job_id: JobId) -> bool {
        self.inner.queue.stop_job(job_id).await
    }

    pub fn shutdown(&self) {
        self.inner.queue.shutdown();
    }
}

struct ExecutionsInner {
    queue: Arc<JobQueue<ExecutionMessage, ExecutionOutcome>>,
    tasks: Arc<dyn TaskStore>,
    executions: Arc<dyn ExecutionStore>,
    runner: Arc<dyn ToolRunner>,
    parser: Arc<dyn OutputParser>,
    pipeline: Arc<dyn FindingsPipeline>,
    execution_lifecycle: ExecutionLifecycle,
    task_lifecycle: TaskLifecycle,
    reports_dir: PathBuf,
}

impl ExecutionsInner {
    async fn enqueue(
        &self,
        mut execution: Execution,
        pools: InputPools,
        dependencies: Vec<JobId>,
        at_front: bool,
    ) -> Result<JobId, StoreError> {
        // Persist the row (with its job id) before the job becomes visible
        // to workers, so a fast worker never races the insert.
        let job_id = Uuid::new_v4();
        execution.enqueued_at = Some(Utc::now());
        execution.job_id = Some(job_id);
        self.executions.save(execution.clone()).await?;
        let message = ExecutionMessage {
            execution: execution.clone(),
            pools,
        };
        self.queue
            .enqueue_with_id(job_id, message, dependencies, at_front, false)
            .await;
        info!(
            execution_id = %execution.id,
            tool = %execution.tool.name,
            configuration = %execution.configuration.name,
            job_id = %job_id,
            "Execution has been enqueued"
        );
        Ok(job_id)
    }

    /// Collect findings from finished dependencies and replan.
    ///
    /// Returns the primary plan for the in-flight job, or `None` when the
    /// dependencies produced nothing usable (the job then proceeds with its
    /// own stored pools and empty findings).
    async fn resolve_dependencies(
        &self,
        job_id: JobId,
        message: &ExecutionMessage,
        dependencies: &[JobId],
    ) -> Result<Option<InputPools>, ExecutionsError> {
        let mut findings: Vec<Finding> = Vec::new();
        for dependency in dependencies {
            // Missing or expired results contribute nothing, never an error.
            if let Some(outcome) = self.queue.fetch_result(*dependency).await {
                findings.extend(outcome.findings);
            }
        }
        if findings.is_empty() {
            info!(job_id = %job_id, "No findings found from dependencies");
            return Ok(None);
        }

        let Some(task) = self.tasks.get(message.execution.task_id).await? else {
            return Ok(None);
        };
        let tool = &message.execution.tool;
        let Some(intensity) = tool.intensity_for(task.intensity) else {
            return Ok(None);
        };

        let candidate = InputPools {
            findings,
            target_ports: message.pools.target_ports.clone(),
            input_vulnerabilities: message.pools.input_vulnerabilities.clone(),
            input_technologies: message.pools.input_technologies.clone(),
            wordlists: message.pools.wordlists.clone(),
        };
        let builder =
            CommandBuilder::new(tool, &message.execution.configuration, intensity, &task.target);
        let plans: Vec<InputPools> = calculate_executions(tool, &candidate)
            .into_iter()
            .filter(|plan| builder.check(plan))
            .collect();
        info!(
            job_id = %job_id,
            new_executions = plans.len().saturating_sub(1),
            "New executions from previous findings"
        );

        let mut new_jobs: Vec<JobId> = Vec::new();
        for plan in plans.iter().skip(1) {
            let new_execution = Execution::new(
                &task,
                message.execution.tool.clone(),
                message.execution.configuration.clone(),
                message.execution.group,
            );
            // At queue start, because it could be a dependency of next jobs.
            let new_job = self
                .enqueue(new_execution, plan.clone(), Vec::new(), true)
                .await?;
            new_jobs.push(new_job);
        }

        if !new_jobs.is_empty() {
            let rewired = self
                .queue
                .rewire_dependents(job_id, &new_jobs, |waiting| ExecutionMessage {
                    execution: waiting.execution.clone(),
                    pools: InputPools {
                        findings: Vec::new(),
                        target_ports: waiting.pools.target_ports.clone(),
                        input_vulnerabilities: waiting.pools.input_vulnerabilities.clone(),
                        input_technologies: waiting.pools.input_technologies.clone(),
                        wordlists: waiting.pools.wordlists.clone(),
                    },
                })
                .await;
            for entry in rewired {
                if let Some(mut execution) =
                    self.executions.get(entry.message.execution.id).await?
                {
                    execution.job_id = Some(entry.new_id);
                    self.executions.save(execution).await?;
                }
            }
        }

        Ok(plans.into_iter().next())
    }

    async fn consume(
        &self,
        job_id: JobId,
        message: ExecutionMessage,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, ExecutionsError> {
        let mut pools = message.pools.clone();
        let dependencies = self.queue.job_dependencies(job_id).await;
        if pools.findings.is_empty() && !dependencies.is_empty() {
            if let Some(primary) = self
                .resolve_dependencies(job_id, &message, &dependencies)
                .await?
            {
                pools = primary;
            }
        }

        let mut execution = match self.executions.get(message.execution.id).await? {
            Some(stored) => stored,
            None => message.execution.clone(),
        };
        let execution_id = execution.id;
        let outcome = move |status: Status, findings: Vec<Finding>| ExecutionOutcome {
            execution_id,
            status,
            findings,
        };

        // A cancellation may have landed while this job sat in the queue.
        if execution.status.is_terminal() {
            return Ok(ExecutionOutcome {
                execution_id: execution.id,
                status: execution.status,
                findings: Vec::new(),
            });
        }

        let Some(mut task) = self.tasks.get(execution.task_id).await? else {
            self.execution_lifecycle
                .fail(&mut execution, "owning task no longer exists".into())
                .await?;
            return Ok(outcome(Status::Error, Vec::new()));
        };

        // The first execution that reaches a worker starts the task.
        if task.start.is_none() && !task.status.is_terminal() {
            self.task_lifecycle.start(&mut task).await?;
        }

        self.execution_lifecycle.start(&mut execution).await?;

        let tool = execution.tool.clone();
        let configuration = execution.configuration.clone();
        let Some(intensity) = tool.intensity_for(task.intensity) else {
            let reason = format!(
                "no intensity of tool {} applies at {}",
                tool.name, task.intensity
            );
            self.execution_lifecycle.fail(&mut execution, reason).await?;
            self.finish_task_if_done(task.id).await?;
            return Ok(outcome(Status::Error, Vec::new()));
        };
        let mut builder = CommandBuilder::new(&tool, &configuration, intensity, &task.target);
        if let Some(format) = &tool.output_format {
            let report = self
                .reports_dir
                .join(format!("{}.{}", Uuid::new_v4(), format));
            builder = builder.with_output(report.display().to_string());
        }

        let arguments = match builder.build(&pools) {
            Ok(arguments) => arguments,
            Err(err) => {
                self.execution_lifecycle
                    .fail(&mut execution, err.to_string())
                    .await?;
                self.finish_task_if_done(task.id).await?;
                return Ok(outcome(Status::Error, Vec::new()));
            }
        };

        let run = match self.runner.run(&tool, &arguments, &cancel).await {
            Ok(run) => run,
            Err(err) => {
                self.execution_lifecycle
                    .fail(&mut execution, err.to_string())
                    .await?;
                self.finish_task_if_done(task.id).await?;
                return Ok(outcome(Status::Error, Vec::new()));
            }
        };

        // Reload: a concurrent cancellation owns terminal state.
        if let Some(latest) = self.executions.get(execution.id).await? {
            if latest.status.is_terminal() {
                return Ok(ExecutionOutcome {
                    execution_id: latest.id,
                    status: latest.status,
                    findings: Vec::new(),
                });
            }
        }

        if run.cancelled {
            self.execution_lifecycle.cancel(&mut execution).await?;
            self.finish_task_if_done(task.id).await?;
            return Ok(outcome(Status::Cancelled, Vec::new()));
        }

        if run.success {
            let findings = self.parser.parse(&tool, &run.stdout);
            self.pipeline.enqueue(&execution, &findings).await;
            self.execution_lifecycle
                .complete(&mut execution, run.stdout)
                .await?;
            self.finish_task_if_done(task.id).await?;
            Ok(outcome(Status::Completed, findings))
        } else {
            self.execution_lifecycle
                .fail(&mut execution, run.stderr)
                .await?;
            self.finish_task_if_done(task.id).await?;
            Ok(outcome(Status::Error, Vec::new()))
        }
    }

    /// Move the task to a terminal status once no execution remains
    /// requested or running. Completion does not require per-step success.
    async fn finish_task_if_done(&self, task_id: Uuid) -> Result<(), ExecutionsError> {
        let executions = self.executions.by_task(task_id).await?;
        if executions
            .iter()
            .any(|execution| !execution.status.is_terminal())
        {
            return Ok(());
        }
        let Some(mut task) = self.tasks.get(task_id).await? else {
            return Ok(());
        };
        if task.status.is_terminal() {
            return Ok(());
        }
        let status = if executions
            .iter()
            .any(|execution| execution.status == Status::Completed)
        {
            Status::Completed
        } else if executions
            .iter()
            .all(|execution| execution.status == Status::Skipped)
        {
            Status::Skipped
        } else if executions
            .iter()
            .any(|execution| execution.status == Status::Error)
        {
            Status::Error
        } else {
            Status::Completed
        };
        self.task_lifecycle.finish(&mut task, status).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler<ExecutionMessage, ExecutionOutcome> for ExecutionsInner {
    async fn handle(
        &self,
        job_id: JobId,
        message: ExecutionMessage,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let execution_id = message.execution.id;
        match self.consume(job_id, message, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(execution_id = %execution_id, error = %err, "Execution consumer failed");
                ExecutionOutcome {
                    execution_id,
                    status: Status::Error,
                    findings: Vec::new(),
                }
            }
        }
    }
}
