//! Error types for report execution.

use async_report_status::StatusError;
use tokio::task::JoinError;
use uuid::Uuid;

/// Error raised by the rendering computation.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("Report rendering failed: {0}")]
    Render(String),

    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by an audit sink. Always discarded by the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit write failed: {0}")]
    Write(String),
}

/// Unified error type for task and executor operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A listener is already attached; one task is one execution attempt.
    #[error("This task has already been queued as {0}")]
    AlreadyQueued(Uuid),

    #[error("Task has not been queued yet")]
    NotQueued,

    /// The computation returned `false` without raising an error.
    #[error("Report computation reported failure")]
    ComputationFailed,

    #[error(transparent)]
    Computation(#[from] ComponentError),

    #[error("Report computation panicked: {0}")]
    Panicked(String),

    #[error("Execution was canceled")]
    Canceled,

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Maximum tracked executions reached: {0}")]
    TooManyTasks(usize),

    #[error("Executor has shut down")]
    ExecutorShutdown,

    #[error("Worker join error: {0}")]
    Join(String),
}

impl ExecutionError {
    /// Returns `true` if the execution ended because it was canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            ExecutionError::Canceled | ExecutionError::Status(StatusError::Canceled)
        )
    }
}

impl From<JoinError> for ExecutionError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            ExecutionError::Canceled
        } else if err.is_panic() {
            ExecutionError::Panicked(panic_message(err.into_panic()))
        } else {
            ExecutionError::Join(err.to_string())
        }
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
