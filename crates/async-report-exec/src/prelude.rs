//! Prelude module for common report execution imports.
//!
//! ```rust
//! use async_report_exec::prelude::*;
//! ```

pub use async_report_status::prelude::*;

pub use crate::audit::{AuditRecord, AuditSink, MemoryAuditSink, MessageType, TracingAuditSink};
pub use crate::cancel::{CancelHandle, CancelableFuture};
pub use crate::component::{ProgressEvent, ProgressListener, ReportComponent, StagedContent};
pub use crate::error::{ComponentError, ExecutionError};
pub use crate::executor::{AsyncReportExecutor, ExecutorConfig, ReportFuture};
pub use crate::listener::StatusListener;
pub use crate::session::{SessionIdentity, SessionTag};
pub use crate::task::AsyncExecutionTask;
