//! Scanforge Orchestrator - Execution scheduling and dependency resolution
//!
//! This crate turns pipeline definitions into wave-ordered dependency
//! graphs of tool invocations and runs them on a dependency-aware
//! asynchronous job queue.
//!
//! # Architecture
//!
//! ```text
//! scanforge-orchestrator/
//! ├── application/      # Use cases
//! │   ├── combinator.rs # Minimal argument-combination planning
//! │   ├── planner.rs    # Process → wave-ordered dependency graph
//! │   └── lifecycle.rs  # Validated state transitions + persistence
//! ├── infrastructure/   # Queues, stores, subprocess runner
//! │   ├── queue.rs      # Generic dependency-aware job queue
//! │   ├── executions.rs # Executions queue + dynamic rewiring
//! │   └── tasks.rs      # Top-level scheduler (immediate/delayed/periodic)
//! └── domain/           # Tasks, executions, processes, collaborator seams
//! ```
//!
//! Data flows top-down (tasks queue → plan builder → executions queue →
//! combinator) and results flow bottom-up through cached job results
//! consumed by dependent jobs. When upstream findings fan out into more
//! argument combinations than the in-flight job can carry, additional
//! executions are spawned and every deferred dependent is rewired to wait
//! for the whole fan-out.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    build_process_plan, calculate_executions, ExecutionLifecycle, ExecutionPlan, LifecycleError,
    PlannedJob, PlannedStep, TaskLifecycle,
};
pub use domain::{Execution, Process, Status, Step, Task, TimeUnit};
pub use infrastructure::{ExecutionsQueue, TaskError, TasksQueue};
