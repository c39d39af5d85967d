//! Tasks queue — top-level scheduler
//!
//! Turns a user-submitted task into executions: immediately, at a scheduled
//! timestamp, or after a delay. Tool tasks are validated synchronously
//! before anything is enqueued; process tasks are expanded through the plan
//! builder into a wave-ordered dependency graph of executions. Periodic
//! tasks reschedule themselves as a chain of fresh task rows anchored to the
//! previous enqueue time, so long runs never introduce drift.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use scanforge_core::domain::{CommandBuilder, CommandError, IntensityRank};

use crate::application::combinator::calculate_executions;
use crate::application::lifecycle::{ExecutionLifecycle, LifecycleError, TaskLifecycle};
use crate::application::planner::{build_process_plan, PlannedStep};
use crate::domain::entities::{Execution, Task};
use crate::domain::value_objects::Status;
use crate::infrastructure::executions::ExecutionsQueue;
use crate::infrastructure::queue::{JobCallback, JobHandler, JobId, JobQueue};
use crate::infrastructure::stores::{ExecutionStore, StoreError, TaskStore};

/// Message stored with every tasks-queue job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: Uuid,
}

/// Result cached for a tasks-queue job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    pub status: Status,
}

/// Errors surfaced to task creators and cancellers.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task {0} can't be cancelled")]
    NotCancellable(Uuid),

    #[error("No intensity of tool '{tool}' is allowed at intensity {rank}")]
    IntensityNotAvailable { tool: String, rank: IntensityRank },

    #[error(transparent)]
    Planning(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Handle to the tasks queue.
#[derive(Clone)]
pub struct TasksQueue {
    inner: Arc<TasksInner>,
}

impl TasksQueue {
    pub fn new(
        result_ttl: std::time::Duration,
        tasks: Arc<dyn TaskStore>,
        executions: Arc<dyn ExecutionStore>,
        executions_queue: ExecutionsQueue,
    ) -> Self {
        let task_lifecycle = TaskLifecycle::new(tasks.clone());
        let execution_lifecycle = ExecutionLifecycle::new(executions.clone());
        Self {
            inner: Arc::new(TasksInner {
                queue: Arc::new(JobQueue::new("tasks", result_ttl)),
                tasks,
                executions,
                executions_queue,
                task_lifecycle,
                execution_lifecycle,
                scheduled: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Spawn the worker pool consuming this queue. The periodic-reschedule
    /// continuation is registered here.
    pub fn start_workers(&self, concurrency: usize) -> tokio::task::JoinHandle<()> {
        let callback: Arc<dyn JobCallback<TaskMessage, TaskOutcome>> =
            Arc::new(PeriodicCallback {
                inner: self.inner.clone(),
            });
        Arc::clone(&self.inner.queue).spawn_worker_pool(
            self.inner.clone(),
            Some(callback),
            concurrency,
        )
    }

    /// Validate and schedule a task.
    ///
    /// Planning errors for tool tasks (no admissible argument combination)
    /// are reported synchronously, before anything is enqueued.
    pub async fn enqueue(&self, mut task: Task) -> Result<Task, TaskError> {
        if let (Some(tool), Some(configuration)) = (task.tool.as_ref(), task.configuration.as_ref())
        {
            let Some(intensity) = tool.intensity_for(task.intensity) else {
                return Err(TaskError::IntensityNotAvailable {
                    tool: tool.name.clone(),
                    rank: task.intensity,
                });
            };
            let builder = CommandBuilder::new(tool, configuration, intensity, &task.target);
            let mut failure: Option<CommandError> = None;
            let admissible = calculate_executions(tool, &task.pools())
                .iter()
                .any(|plan| match builder.build(plan) {
                    Ok(_) => true,
                    Err(err) => {
                        failure.get_or_insert(err);
                        false
                    }
                });
            if !admissible {
                if let Some(err) = failure {
                    return Err(TaskError::Planning(err));
                }
            }
        }

        let now = Utc::now();
        let scheduled_for = if let Some(at) = task.scheduled_at {
            at
        } else if let (Some(amount), Some(unit)) = (task.scheduled_in, task.scheduled_time_unit) {
            now + unit.duration(amount)
        } else {
            now
        };
        // Recorded before the delay, not after: periodic rescheduling is
        // anchored to this timestamp.
        task.enqueued_at = Some(scheduled_for);
        self.inner.tasks.save(task.clone()).await?;
        TasksInner::schedule(&self.inner, task.clone(), scheduled_for).await?;
        self.inner
            .tasks
            .get(task.id)
            .await?
            .ok_or(TaskError::NotFound(task.id))
    }

    /// Cancel a task and all of its executions.
    ///
    /// Cancelling a task already in a terminal state fails without side
    /// effects.
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<(), TaskError> {
        let inner = &self.inner;
        let Some(mut task) = inner.tasks.get(task_id).await? else {
            return Err(TaskError::NotFound(task_id));
        };
        if task.status.is_terminal() {
            warn!(task_id = %task_id, status = %task.status, "Task can't be cancelled");
            return Err(TaskError::NotCancellable(task_id));
        }

        if let Some(handle) = inner.scheduled.lock().await.remove(&task_id) {
            handle.abort();
        }
        if let Some(job_id) = task.job_id {
            inner.queue.cancel_job(job_id).await;
            inner.queue.delete_job(job_id).await;
        }

        for mut execution in inner.executions.by_task(task_id).await? {
            if execution.status.is_terminal() {
                continue;
            }
            if let Some(job_id) = execution.job_id {
                if execution.status == Status::Running {
                    inner.executions_queue.stop_job(job_id).await;
                } else {
                    inner.executions_queue.cancel_job(job_id).await;
                }
            }
            inner.execution_lifecycle.cancel(&mut execution).await?;
        }

        inner.task_lifecycle.cancel(&mut task).await?;
        info!(task_id = %task_id, "Task has been cancelled");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.inner.queue.shutdown();
    }
}

struct TasksInner {
    queue: Arc<JobQueue<TaskMessage, TaskOutcome>>,
    tasks: Arc<dyn TaskStore>,
    executions: Arc<dyn ExecutionStore>,
    executions_queue: ExecutionsQueue,
    task_lifecycle: TaskLifecycle,
    execution_lifecycle: ExecutionLifecycle,
    /// Delayed-enqueue handles for scheduled tasks, by task id
    scheduled: Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>,
}

impl TasksInner {
    /// Enqueue a task now, or spawn the delayed-execution primitive that
    /// will enqueue it at its scheduled time.
    async fn schedule(
        inner: &Arc<TasksInner>,
        mut task: Task,
        when: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        let now = Utc::now();
        if when <= now {
            // Persist the job id before the job is visible to workers.
            let job_id = Uuid::new_v4();
            task.job_id = Some(job_id);
            inner.tasks.save(task.clone()).await?;
            inner
                .queue
                .enqueue_with_id(job_id, TaskMessage { task_id: task.id }, Vec::new(), false, true)
                .await;
            info!(task_id = %task.id, "Task has been enqueued");
        } else {
            let delay = (when - now).to_std().unwrap_or_default();
            let task_id = task.id;
            let spawned = Arc::clone(inner);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let job_id = Uuid::new_v4();
                if let Ok(Some(mut task)) = spawned.tasks.get(task_id).await {
                    task.job_id = Some(job_id);
                    let _ = spawned.tasks.save(task).await;
                }
                spawned
                    .queue
                    .enqueue_with_id(job_id, TaskMessage { task_id }, Vec::new(), false, true)
                    .await;
                spawned.scheduled.lock().await.remove(&task_id);
            });
            inner.scheduled.lock().await.insert(task_id, handle);
            info!(task_id = %task.id, scheduled_at = %when, "Task will be enqueued at its scheduled time");
        }
        Ok(())
    }

    async fn consume(&self, task_id: Uuid) -> Result<Status, TaskError> {
        let Some(task) = self.tasks.get(task_id).await? else {
            return Err(TaskError::NotFound(task_id));
        };
        // Cancelled while waiting for its schedule or a worker.
        if task.status.is_terminal() {
            return Ok(task.status);
        }

        if task.tool.is_some() && task.configuration.is_some() {
            self.consume_tool_task(&task).await?;
        } else if task.process.is_some() {
            self.consume_process_task(&task).await?;
        } else {
            let mut task = task.clone();
            self.task_lifecycle.finish(&mut task, Status::Skipped).await?;
            return Ok(Status::Skipped);
        }

        let status = self
            .tasks
            .get(task_id)
            .await?
            .map(|task| task.status)
            .unwrap_or(Status::Error);
        Ok(status)
    }

    async fn consume_tool_task(&self, task: &Task) -> Result<(), TaskError> {
        let (Some(tool), Some(configuration)) = (task.tool.as_ref(), task.configuration.as_ref())
        else {
            return Ok(());
        };
        let Some(intensity) = tool.intensity_for(task.intensity) else {
            let mut task = task.clone();
            self.task_lifecycle.finish(&mut task, Status::Error).await?;
            return Ok(());
        };
        let builder = CommandBuilder::new(tool, configuration, intensity, &task.target);
        let plans: Vec<_> = calculate_executions(tool, &task.pools())
            .into_iter()
            .filter(|plan| builder.check(plan))
            .collect();
        if plans.is_empty() {
            let mut task = task.clone();
            self.task_lifecycle.finish(&mut task, Status::Error).await?;
            return Ok(());
        }
        for plan in plans {
            let execution = Execution::new(task, tool.clone(), configuration.clone(), 1);
            self.executions_queue
                .enqueue(execution, plan, Vec::new(), false)
                .await?;
        }
        Ok(())
    }

    async fn consume_process_task(&self, task: &Task) -> Result<(), TaskError> {
        let Some(process) = task.process.as_ref() else {
            return Ok(());
        };
        let plan = build_process_plan(process, task.intensity);
        let mut jobs_per_entry: Vec<Vec<JobId>> = vec![Vec::new(); plan.len()];
        let mut any_enqueued = false;

        for (index, entry) in plan.iter().enumerate() {
            match entry {
                PlannedStep::Skipped { step, reason } => {
                    let mut execution =
                        Execution::new(task, step.tool.clone(), step.configuration.clone(), 1);
                    self.executions.save(execution.clone()).await?;
                    self.execution_lifecycle
                        .skip(&mut execution, reason.clone())
                        .await?;
                }
                PlannedStep::Job(job) => {
                    let dependencies: Vec<JobId> = job
                        .dependencies
                        .iter()
                        .flat_map(|dependency| jobs_per_entry[*dependency].iter().copied())
                        .collect();
                    for step_plan in calculate_executions(&job.step.tool, &task.pools()) {
                        let execution = Execution::new(
                            task,
                            job.step.tool.clone(),
                            job.step.configuration.clone(),
                            job.wave,
                        );
                        let job_id = self
                            .executions_queue
                            .enqueue(execution, step_plan, dependencies.clone(), false)
                            .await?;
                        jobs_per_entry[index].push(job_id);
                        any_enqueued = true;
                    }
                }
            }
        }

        // Every step was excluded: the task is finished before it started.
        if !any_enqueued {
            let mut task = task.clone();
            self.task_lifecycle.finish(&mut task, Status::Skipped).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler<TaskMessage, TaskOutcome> for TasksInner {
    async fn handle(
        &self,
        _job_id: JobId,
        message: TaskMessage,
        _cancel: CancellationToken,
    ) -> TaskOutcome {
        match self.consume(message.task_id).await {
            Ok(status) => TaskOutcome {
                task_id: message.task_id,
                status,
            },
            Err(err) => {
                error!(task_id = %message.task_id, error = %err, "Task consumer failed");
                if let Ok(Some(mut task)) = self.tasks.get(message.task_id).await {
                    if !task.status.is_terminal() {
                        let _ = self.task_lifecycle.finish(&mut task, Status::Error).await;
                    }
                }
                TaskOutcome {
                    task_id: message.task_id,
                    status: Status::Error,
                }
            }
        }
    }
}

/// Continuation rescheduling periodic tasks after a successful run.
///
/// The next run is a fresh task row anchored at the previous enqueue time
/// plus the repeat interval, never at "now plus interval".
struct PeriodicCallback {
    inner: Arc<TasksInner>,
}

#[async_trait]
impl JobCallback<TaskMessage, TaskOutcome> for PeriodicCallback {
    async fn on_success(&self, _job_id: JobId, message: &TaskMessage, _result: &TaskOutcome) {
        let Ok(Some(task)) = self.inner.tasks.get(message.task_id).await else {
            return;
        };
        let (Some(amount), Some(unit)) = (task.repeat_in, task.repeat_time_unit) else {
            return;
        };
        let base = task.enqueued_at.unwrap_or_else(Utc::now);
        let next_at = base + unit.duration(amount);
        let mut next = task.repeat_clone(next_at);
        next.enqueued_at = Some(next_at);
        if let Err(err) = self.inner.tasks.save(next.clone()).await {
            warn!(task_id = %task.id, error = %err, "Failed to persist the next periodic task");
            return;
        }
        if let Err(err) = TasksInner::schedule(&self.inner, next.clone(), next_at).await {
            warn!(task_id = %task.id, error = %err, "Failed to schedule the next periodic task");
            return;
        }
        info!(
            task_id = %task.id,
            next_task_id = %next.id,
            next_at = %next_at,
            "Scheduled task has been enqueued again"
        );
    }
}
