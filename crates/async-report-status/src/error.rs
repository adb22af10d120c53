//! Error types for status transitions.

use crate::status::ExecutionStatus;

/// Why a requested status transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("Invalid status transition: {current:?} -> {requested:?}")]
    InvalidTransition {
        current: ExecutionStatus,
        requested: ExecutionStatus,
    },

    #[error("Execution is in terminal state: {0:?}")]
    TerminalState(ExecutionStatus),

    /// Cancellation is sticky and wins over every later transition.
    #[error("Execution was canceled")]
    Canceled,
}
