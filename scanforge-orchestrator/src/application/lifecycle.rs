//! Lifecycle controllers — centralised state-machine control for tasks and
//! executions.
//!
//! Every status change goes through a lifecycle controller which validates
//! the transition against the state machine on [`Status`], stamps the
//! relevant timestamps, persists through the store and logs the change.
//! Use-cases and queue consumers call these instead of mutating entities
//! directly, which is what keeps terminal records immutable.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::entities::{Execution, Task};
use crate::domain::value_objects::{Status, TransitionError};
use crate::infrastructure::stores::{ExecutionStore, StoreError, TaskStore};

/// Errors from the lifecycle layer.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Centralised execution lifecycle controller.
#[derive(Clone)]
pub struct ExecutionLifecycle {
    executions: Arc<dyn ExecutionStore>,
}

impl ExecutionLifecycle {
    pub fn new(executions: Arc<dyn ExecutionStore>) -> Self {
        Self { executions }
    }

    /// Transition an execution to [`Status::Running`] and stamp its start.
    pub async fn start(&self, execution: &mut Execution) -> Result<(), LifecycleError> {
        execution.transition(Status::Running)?;
        execution.start = Some(Utc::now());
        self.executions.save(execution.clone()).await?;
        info!(execution_id = %execution.id, "Execution transitioned to Running");
        Ok(())
    }

    /// Transition an execution to [`Status::Completed`] with its output.
    pub async fn complete(
        &self,
        execution: &mut Execution,
        output: String,
    ) -> Result<(), LifecycleError> {
        execution.transition(Status::Completed)?;
        execution.output_plain = Some(output);
        execution.end = Some(Utc::now());
        self.executions.save(execution.clone()).await?;
        info!(execution_id = %execution.id, "Execution transitioned to Completed");
        Ok(())
    }

    /// Transition an execution to [`Status::Error`] with captured output.
    pub async fn fail(
        &self,
        execution: &mut Execution,
        error: String,
    ) -> Result<(), LifecycleError> {
        execution.transition(Status::Error)?;
        execution.output_error = Some(error.clone());
        execution.end = Some(Utc::now());
        self.executions.save(execution.clone()).await?;
        warn!(execution_id = %execution.id, error = %error, "Execution transitioned to Error");
        Ok(())
    }

    /// Record an execution that will never run, with the reason.
    pub async fn skip(
        &self,
        execution: &mut Execution,
        reason: String,
    ) -> Result<(), LifecycleError> {
        execution.transition(Status::Skipped)?;
        execution.skipped_reason = Some(reason.clone());
        self.executions.save(execution.clone()).await?;
        info!(execution_id = %execution.id, reason = %reason, "Execution transitioned to Skipped");
        Ok(())
    }

    /// Transition an execution to [`Status::Cancelled`] and stamp its end.
    pub async fn cancel(&self, execution: &mut Execution) -> Result<(), LifecycleError> {
        execution.transition(Status::Cancelled)?;
        execution.end = Some(Utc::now());
        self.executions.save(execution.clone()).await?;
        info!(execution_id = %execution.id, "Execution transitioned to Cancelled");
        Ok(())
    }
}

/// Centralised task lifecycle controller.
#[derive(Clone)]
pub struct TaskLifecycle {
    tasks: Arc<dyn TaskStore>,
}

impl TaskLifecycle {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }

    /// Transition a task to [`Status::Running`] and stamp its start.
    pub async fn start(&self, task: &mut Task) -> Result<(), LifecycleError> {
        task.transition(Status::Running)?;
        task.start = Some(Utc::now());
        self.tasks.save(task.clone()).await?;
        info!(task_id = %task.id, "Task transitioned to Running");
        Ok(())
    }

    /// Move a task to a terminal status and stamp its end.
    pub async fn finish(&self, task: &mut Task, status: Status) -> Result<(), LifecycleError> {
        task.transition(status)?;
        task.end = Some(Utc::now());
        self.tasks.save(task.clone()).await?;
        info!(task_id = %task.id, status = %status, "Task reached terminal status");
        Ok(())
    }

    /// Transition a task to [`Status::Cancelled`] and stamp its end.
    pub async fn cancel(&self, task: &mut Task) -> Result<(), LifecycleError> {
        task.transition(Status::Cancelled)?;
        task.end = Some(Utc::now());
        self.tasks.save(task.clone()).await?;
        info!(task_id = %task.id, "Task transitioned to Cancelled");
        Ok(())
    }
}
