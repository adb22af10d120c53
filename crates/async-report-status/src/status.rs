//! The execution status enum.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatusError;
use crate::state_machine;

/// Lifecycle status of one report execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Accepted by the executor, waiting for a worker.
    Queued,
    /// Committed to a worker; cancellation is refused from here on.
    Scheduled,
    /// The computation reported that processing started.
    Working,
    /// First-page mode only: partial output is ready while work continues.
    ContentAvailable,
    Finished,
    Failed,
    /// Sticky: nothing overwrites it.
    Canceled,
}

impl ExecutionStatus {
    /// Returns `true` for `Finished`, `Failed` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        state_machine::is_terminal(self)
    }

    /// Returns `true` while the computation is running.
    pub fn is_working(self) -> bool {
        matches!(self, ExecutionStatus::Working | ExecutionStatus::ContentAvailable)
    }

    /// Validate a move to `to`, returning the new status on success.
    pub fn try_transition(self, to: ExecutionStatus) -> Result<ExecutionStatus, StatusError> {
        state_machine::validate_transition(self, to)?;
        Ok(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Scheduled => "SCHEDULED",
            ExecutionStatus::Working => "WORKING",
            ExecutionStatus::ContentAvailable => "CONTENT_AVAILABLE",
            ExecutionStatus::Finished => "FINISHED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
