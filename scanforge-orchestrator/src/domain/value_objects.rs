//! Orchestrator value objects

use serde::{Deserialize, Serialize};

/// Status shared by tasks and executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Created, waiting for a worker
    Requested,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Error,
    /// Never executed (e.g. excluded by intensity)
    Skipped,
    /// Cancelled before completion
    Cancelled,
}

impl Status {
    /// Returns the set of valid target states from the current state.
    ///
    /// ```text
    /// Requested ──► Running ──► Completed
    ///    │             │
    ///    │             ├──► Error
    ///    ├──► Skipped  └──► Cancelled
    ///    ├──► Error
    ///    └──► Cancelled
    /// ```
    pub fn valid_transitions(&self) -> &[Status] {
        match self {
            Self::Requested => &[
                Self::Running,
                Self::Skipped,
                Self::Error,
                Self::Cancelled,
            ],
            Self::Running => &[Self::Completed, Self::Error, Self::Cancelled],
            Self::Completed | Self::Error | Self::Skipped | Self::Cancelled => &[],
        }
    }

    /// Check whether transitioning to `target` is allowed from the current state.
    pub fn can_transition_to(&self, target: &Status) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Whether this status represents a terminal (final) state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Skipped | Self::Cancelled
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Error => write!(f, "Error"),
            Self::Skipped => write!(f, "Skipped"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Error returned when an invalid status transition is attempted.
#[derive(Debug, thiserror::Error)]
#[error("Invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}

/// Time unit for scheduling arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    /// Convert an amount of this unit into a duration.
    pub fn duration(&self, amount: u32) -> chrono::Duration {
        let amount = i64::from(amount);
        match self {
            Self::Minutes => chrono::Duration::minutes(amount),
            Self::Hours => chrono::Duration::hours(amount),
            Self::Days => chrono::Duration::days(amount),
            Self::Weeks => chrono::Duration::weeks(amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(Status::Skipped.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::Requested.is_terminal());
        assert!(!Status::Running.is_terminal());
    }

    #[test]
    fn valid_transitions() {
        assert!(Status::Requested.can_transition_to(&Status::Running));
        assert!(Status::Requested.can_transition_to(&Status::Skipped));
        assert!(Status::Running.can_transition_to(&Status::Completed));
        assert!(Status::Running.can_transition_to(&Status::Cancelled));
        assert!(!Status::Requested.can_transition_to(&Status::Completed));
        assert!(!Status::Completed.can_transition_to(&Status::Running));
        assert!(!Status::Cancelled.can_transition_to(&Status::Requested));
    }

    #[test]
    fn time_unit_arithmetic() {
        assert_eq!(TimeUnit::Days.duration(1), chrono::Duration::days(1));
        assert_eq!(TimeUnit::Minutes.duration(90), chrono::Duration::minutes(90));
    }
}
