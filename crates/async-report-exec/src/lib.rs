//! # Async Report Exec
//!
//! **Cancellable, progress-reporting execution of long-running report renders.**
//!
//! A report render is wrapped in an [`AsyncExecutionTask`] and handed to the
//! [`AsyncReportExecutor`], which runs it on a bounded worker pool. Pollers on
//! other threads read consistent [`StatusRecord`] snapshots by execution id,
//! hint which page they want next, and cancel work that has not yet been
//! committed to a worker.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use async_report_exec::prelude::*;
//!
//! struct HelloReport;
//!
//! impl ReportComponent for HelloReport {
//!     fn mime_type(&self) -> String {
//!         "text/plain".to_string()
//!     }
//!
//!     fn execute(
//!         &self,
//!         progress: &dyn ProgressListener,
//!         output: &mut Vec<u8>,
//!     ) -> Result<bool, ComponentError> {
//!         progress.processing_started(&ProgressEvent::started());
//!         output.extend_from_slice(b"hello");
//!         progress.processing_finished(&ProgressEvent::new(Activity::GeneratingContent, 1.0, 1, 1));
//!         Ok(true)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ExecutionError> {
//! let executor = AsyncReportExecutor::new(ExecutorConfig::default().with_pool_size(2));
//! let task = AsyncExecutionTask::new("/public/hello.prpt", Arc::new(HelloReport), None, "audit-1");
//!
//! let (id, future) = executor.add_task(task).await?;
//! let content = future.await??;
//! assert_eq!(&content.data[..], b"hello");
//!
//! let status = executor.get_status(id).await.expect("tracked");
//! assert_eq!(status.status(), ExecutionStatus::Finished);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`StatusListener`**: per-execution status record behind a lock, fed by
//!   progress events and lifecycle transitions
//! - **`AsyncExecutionTask`**: runs the component, emits audit records, owns the
//!   cancel policy that refuses once the task is scheduled
//! - **`CancelableFuture`**: policy-gated wrapper around the worker's join handle
//! - **`AsyncReportExecutor`**: id table plus a semaphore-bounded worker pool
//! - **`request_context`**: task-local request id visible to audit sinks

pub mod audit;
pub mod cancel;
pub mod component;
pub mod error;
pub mod executor;
pub mod listener;
pub mod prelude;
pub mod request_context;
pub mod session;
pub mod task;

pub use audit::{
    AuditRecord, AuditSink, MemoryAuditSink, MessageType, NullAuditSink, TracingAuditSink,
};
pub use cancel::{CancelHandle, CancelPolicy, CancelableFuture, NativeCancel, TaskAbort};
pub use component::{
    ProgressEvent, ProgressFanout, ProgressListener, ReportComponent, StagedContent,
};
pub use error::{AuditError, ComponentError, ExecutionError};
pub use executor::{AsyncReportExecutor, ExecutorConfig, ReportFuture};
pub use listener::StatusListener;
pub use session::{SessionIdentity, SessionTag, UNKNOWN_USER};
pub use task::{AsyncExecutionTask, CANCELED_AUDIT_VALUE};

pub use async_report_status::{Activity, ExecutionStatus, StatusError, StatusRecord};
