//! Execution status state machine enforcement.
//!
//! Validates transitions for the report execution lifecycle:
//!
//! ```text
//! Queued           -> Scheduled | Working | Finished | Failed | Canceled
//! Scheduled        -> Working | Finished | Failed
//! Working          -> ContentAvailable | Finished | Failed | Canceled
//! ContentAvailable -> Finished | Failed | Canceled
//! Finished/Failed  -> ERROR (terminal)
//! Canceled         -> ERROR (sticky, wins over every later write)
//! ```
//!
//! Nothing ever moves back to `Queued`. A scheduled execution cannot be
//! canceled because a worker has already committed to it.

use crate::error::StatusError;
use crate::status::ExecutionStatus;

/// Validate a status transition.
///
/// Returns `Ok(())` if the transition is allowed, `Err(StatusError::Canceled)`
/// when the current status is `Canceled`, `Err(StatusError::TerminalState)`
/// for other terminal statuses and `Err(StatusError::InvalidTransition)`
/// otherwise.
pub fn validate_transition(from: ExecutionStatus, to: ExecutionStatus) -> Result<(), StatusError> {
    use ExecutionStatus::*;

    let invalid = Err(StatusError::InvalidTransition {
        current: from,
        requested: to,
    });

    match from {
        Canceled => Err(StatusError::Canceled),
        Finished | Failed => Err(StatusError::TerminalState(from)),
        Queued => match to {
            Scheduled | Working | Finished | Failed | Canceled => Ok(()),
            Queued | ContentAvailable => invalid,
        },
        Scheduled => match to {
            Working | Finished | Failed => Ok(()),
            Queued | Scheduled | ContentAvailable | Canceled => invalid,
        },
        Working => match to {
            ContentAvailable | Finished | Failed | Canceled => Ok(()),
            Queued | Scheduled | Working => invalid,
        },
        ContentAvailable => match to {
            Finished | Failed | Canceled => Ok(()),
            Queued | Scheduled | Working | ContentAvailable => invalid,
        },
    }
}

/// Returns `true` if the status is terminal (no further transitions allowed).
pub fn is_terminal(status: ExecutionStatus) -> bool {
    matches!(
        status,
        ExecutionStatus::Finished | ExecutionStatus::Failed | ExecutionStatus::Canceled
    )
}
