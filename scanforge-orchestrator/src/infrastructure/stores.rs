//! Task and execution persistence
//!
//! The backing database is an external concern; the engine only needs
//! these seams. The in-memory implementations back tests and single-node
//! deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::entities::{Execution, Task};

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Storage backend failed: {0}")]
    Backend(String),
}

/// Task storage interface.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: Task) -> Result<(), StoreError>;
    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn all(&self) -> Result<Vec<Task>, StoreError>;
}

/// Execution storage interface.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save(&self, execution: Execution) -> Result<(), StoreError>;
    async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>, StoreError>;
    /// Every execution belonging to a task, in insertion order.
    async fn by_task(&self, task_id: Uuid) -> Result<Vec<Execution>, StoreError>;
}

/// In-memory task store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().await.get(&task_id).cloned())
    }

    async fn all(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.tasks.lock().await.values().cloned().collect())
    }
}

/// In-memory execution store.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: Mutex<Vec<Execution>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: Execution) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().await;
        match executions.iter_mut().find(|existing| existing.id == execution.id) {
            Some(existing) => *existing = execution,
            None => executions.push(execution),
        }
        Ok(())
    }

    async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .await
            .iter()
            .find(|execution| execution.id == execution_id)
            .cloned())
    }

    async fn by_task(&self, task_id: Uuid) -> Result<Vec<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .await
            .iter()
            .filter(|execution| execution.task_id == task_id)
            .cloned()
            .collect())
    }
}
