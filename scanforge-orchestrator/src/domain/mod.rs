//! Orchestrator domain layer

pub mod entities;
pub mod services;
pub mod value_objects;

pub use entities::{Execution, Process, Step, Task};
pub use services::{
    FindingsPipeline, LoggingFindingsPipeline, NoopParser, OutputParser, RunOutcome, ToolRunner,
};
pub use value_objects::{Status, TimeUnit, TransitionError};
