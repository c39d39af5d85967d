//! Orchestrator domain entities

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scanforge_core::domain::{
    Configuration, InputPools, InputTechnology, InputVulnerability, IntensityRank, Target,
    TargetPort, Tool, Wordlist,
};

use super::value_objects::{Status, TimeUnit, TransitionError};

/// A named ordered pipeline of tool configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<Step>,
}

/// One stage of a process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub tool: Arc<Tool>,
    pub configuration: Arc<Configuration>,
    /// Order among steps of the same stage; lower runs first
    pub priority: u32,
}

/// A user request to run a tool or a process against a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub target: Target,
    pub process: Option<Arc<Process>>,
    pub tool: Option<Arc<Tool>>,
    pub configuration: Option<Arc<Configuration>>,
    pub intensity: IntensityRank,
    pub status: Status,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub scheduled_in: Option<u32>,
    pub scheduled_time_unit: Option<TimeUnit>,
    pub repeat_in: Option<u32>,
    pub repeat_time_unit: Option<TimeUnit>,
    pub creation: DateTime<Utc>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Job id in the tasks queue
    pub job_id: Option<Uuid>,
    pub target_ports: Vec<TargetPort>,
    pub input_vulnerabilities: Vec<InputVulnerability>,
    pub input_technologies: Vec<InputTechnology>,
    pub wordlists: Vec<Wordlist>,
}

impl Task {
    pub fn new_tool_task(
        target: Target,
        tool: Arc<Tool>,
        configuration: Arc<Configuration>,
        intensity: IntensityRank,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            process: None,
            tool: Some(tool),
            configuration: Some(configuration),
            intensity,
            status: Status::Requested,
            scheduled_at: None,
            scheduled_in: None,
            scheduled_time_unit: None,
            repeat_in: None,
            repeat_time_unit: None,
            creation: Utc::now(),
            enqueued_at: None,
            start: None,
            end: None,
            job_id: None,
            target_ports: Vec::new(),
            input_vulnerabilities: Vec::new(),
            input_technologies: Vec::new(),
            wordlists: Vec::new(),
        }
    }

    pub fn new_process_task(
        target: Target,
        process: Arc<Process>,
        intensity: IntensityRank,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            process: Some(process),
            tool: None,
            configuration: None,
            intensity,
            status: Status::Requested,
            scheduled_at: None,
            scheduled_in: None,
            scheduled_time_unit: None,
            repeat_in: None,
            repeat_time_unit: None,
            creation: Utc::now(),
            enqueued_at: None,
            start: None,
            end: None,
            job_id: None,
            target_ports: Vec::new(),
            input_vulnerabilities: Vec::new(),
            input_technologies: Vec::new(),
            wordlists: Vec::new(),
        }
    }

    /// The pools of user-supplied parameters this task directly provides.
    /// The findings pool is always empty at planning time.
    pub fn pools(&self) -> InputPools {
        InputPools {
            findings: Vec::new(),
            target_ports: self.target_ports.clone(),
            input_vulnerabilities: self.input_vulnerabilities.clone(),
            input_technologies: self.input_technologies.clone(),
            wordlists: self.wordlists.clone(),
        }
    }

    /// Whether this task reschedules itself after completion.
    pub fn is_periodic(&self) -> bool {
        self.repeat_in.is_some() && self.repeat_time_unit.is_some()
    }

    /// Fresh task row for the next run of a periodic task, scheduled at
    /// the previous enqueue time plus the repeat interval (drift-free).
    pub fn repeat_clone(&self, next_at: DateTime<Utc>) -> Task {
        let mut next = self.clone();
        next.id = Uuid::new_v4();
        next.status = Status::Requested;
        next.scheduled_at = Some(next_at);
        next.scheduled_in = None;
        next.scheduled_time_unit = None;
        next.creation = Utc::now();
        next.enqueued_at = None;
        next.start = None;
        next.end = None;
        next.job_id = None;
        next
    }

    /// Validated status transition.
    pub fn transition(&mut self, to: Status) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(&to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target.address)?;
        if let Some(process) = &self.process {
            write!(f, " - {}", process.name)?;
        } else if let Some(tool) = &self.tool {
            write!(f, " - {}", tool.name)?;
            if let Some(configuration) = &self.configuration {
                write!(f, " - {}", configuration.name)?;
            }
        }
        Ok(())
    }
}

/// One concrete, queued tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Concurrency wave within a process task; 1 for tool tasks
    pub group: u32,
    /// Job id in the executions queue
    pub job_id: Option<Uuid>,
    pub tool: Arc<Tool>,
    pub configuration: Arc<Configuration>,
    pub status: Status,
    pub output_plain: Option<String>,
    pub output_error: Option<String>,
    pub skipped_reason: Option<String>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new(task: &Task, tool: Arc<Tool>, configuration: Arc<Configuration>, group: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            group,
            job_id: None,
            tool,
            configuration,
            status: Status::Requested,
            output_plain: None,
            output_error: None,
            skipped_reason: None,
            enqueued_at: None,
            start: None,
            end: None,
        }
    }

    /// Validated status transition. Terminal executions never change again.
    pub fn transition(&mut self, to: Status) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(&to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

impl std::fmt::Display for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.tool.name, self.configuration.name)
    }
}
