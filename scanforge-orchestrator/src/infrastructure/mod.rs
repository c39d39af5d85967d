//! Orchestrator infrastructure layer

pub mod executions;
pub mod queue;
pub mod runner;
pub mod stores;
pub mod tasks;

pub use executions::{ExecutionMessage, ExecutionOutcome, ExecutionsQueue};
pub use queue::{JobCallback, JobHandler, JobId, JobQueue, JobState, RewiredJob};
pub use runner::SubprocessRunner;
pub use stores::{
    ExecutionStore, InMemoryExecutionStore, InMemoryTaskStore, StoreError, TaskStore,
};
pub use tasks::{TaskError, TaskMessage, TaskOutcome, TasksQueue};
