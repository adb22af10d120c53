//! The callable unit of work submitted to the executor.
//!
//! An [`AsyncExecutionTask`] bridges the opaque [`ReportComponent`] with the
//! status and audit machinery. It is one execution attempt: it owns exactly one
//! [`StatusListener`], attached when the task is queued.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_report_status::ExecutionStatus;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, MessageType, NullAuditSink};
use crate::cancel::{CancelHandle, CancelPolicy, CancelableFuture, NativeCancel};
use crate::component::{ProgressFanout, ProgressListener, ReportComponent, StagedContent};
use crate::error::{ExecutionError, panic_message};
use crate::listener::StatusListener;
use crate::request_context;
use crate::session::{SessionIdentity, session_labels};

/// Audit `value` of the terminal record for a canceled execution.
pub const CANCELED_AUDIT_VALUE: &str = "canceled";

const TASK_TYPE: &str = "AsyncExecutionTask";

/// Listener plus the progress chain handed to the component.
struct Attachment {
    listener: Arc<StatusListener>,
    progress: ProgressFanout,
}

/// One report execution attempt.
pub struct AsyncExecutionTask {
    component: Arc<dyn ReportComponent>,
    path: String,
    audit_id: String,
    session: Option<Arc<dyn SessionIdentity>>,
    audit: Arc<dyn AuditSink>,
    first_page_mode: bool,
    attachment: OnceLock<Attachment>,
}

impl AsyncExecutionTask {
    /// Create a task.
    ///
    /// * `path` - logical report path, used for audit records
    /// * `component` - the rendering computation
    /// * `session` - requester identity, used only for audit tagging
    /// * `audit_id` - audit id of this execution, usually minted by the request handler
    pub fn new(
        path: impl Into<String>,
        component: Arc<dyn ReportComponent>,
        session: Option<Arc<dyn SessionIdentity>>,
        audit_id: impl Into<String>,
    ) -> Self {
        Self {
            component,
            path: path.into(),
            audit_id: audit_id.into(),
            session,
            audit: Arc::new(NullAuditSink),
            first_page_mode: false,
            attachment: OnceLock::new(),
        }
    }

    /// Replace the audit sink (defaults to [`NullAuditSink`]).
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Report `ContentAvailable` as soon as the first page is generated.
    pub fn with_first_page_mode(mut self, first_page_mode: bool) -> Self {
        self.first_page_mode = first_page_mode;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn audit_id(&self) -> &str {
        &self.audit_id
    }

    pub fn mime_type(&self) -> String {
        self.component.mime_type()
    }

    /// The attached listener, if the task has been queued.
    pub fn listener(&self) -> Option<&Arc<StatusListener>> {
        self.attachment.get().map(|a| &a.listener)
    }

    // === Queueing ===

    /// Attach a fresh listener bound to `id`.
    ///
    /// Fails with [`ExecutionError::AlreadyQueued`] on a second call.
    pub fn notify_task_queued(&self, id: Uuid) -> Result<Arc<StatusListener>, ExecutionError> {
        self.notify_task_queued_with(id, Vec::new())
    }

    /// Attach a fresh listener bound to `id` plus extra progress listeners
    /// that see every event after the status listener.
    pub fn notify_task_queued_with(
        &self,
        id: Uuid,
        extra: Vec<Arc<dyn ProgressListener>>,
    ) -> Result<Arc<StatusListener>, ExecutionError> {
        if let Some(existing) = self.attachment.get() {
            return Err(ExecutionError::AlreadyQueued(existing.listener.id()));
        }

        let listener = Arc::new(StatusListener::new(id, &self.path, self.mime_type()));
        listener.set_first_page_mode(self.first_page_mode);

        let mut chain: Vec<Arc<dyn ProgressListener>> = Vec::with_capacity(extra.len() + 1);
        chain.push(listener.clone());
        chain.extend(extra);

        let attachment = Attachment {
            listener: Arc::clone(&listener),
            progress: ProgressFanout::new(chain),
        };
        self.attachment.set(attachment).map_err(|lost| {
            ExecutionError::AlreadyQueued(
                self.attachment
                    .get()
                    .map(|a| a.listener.id())
                    .unwrap_or_else(|| lost.listener.id()),
            )
        })?;

        debug!(execution_id = %id, path = %self.path, "Task queued");
        Ok(listener)
    }

    fn attached(&self) -> Result<&Attachment, ExecutionError> {
        self.attachment.get().ok_or(ExecutionError::NotQueued)
    }

    /// Forward a requested-page hint. No effect once terminal.
    pub fn request_page(&self, page: u32) -> Result<bool, ExecutionError> {
        Ok(self.attached()?.listener.set_requested_page(page))
    }

    /// Move to `Scheduled`. Returns whether the listener is now scheduled.
    pub fn schedule(&self) -> Result<bool, ExecutionError> {
        let listener = &self.attached()?.listener;
        listener.on_scheduled();
        Ok(listener.is_scheduled())
    }

    // === Cancellation ===

    /// The cancellation policy for this task.
    pub fn cancel_policy(&self) -> Result<Arc<dyn CancelPolicy>, ExecutionError> {
        let (_, user) = session_labels(self.session.as_deref());
        Ok(Arc::new(TaskCancelPolicy {
            listener: Arc::clone(&self.attached()?.listener),
            path: self.path.clone(),
            requested_by: user,
        }))
    }

    pub fn cancel_handle(
        &self,
        native: Arc<dyn NativeCancel>,
    ) -> Result<CancelHandle, ExecutionError> {
        Ok(CancelHandle::new(self.cancel_policy()?, native))
    }

    /// Wrap `inner` so that cancelling it goes through this task's policy.
    pub fn delegate<F>(
        &self,
        inner: F,
        native: Arc<dyn NativeCancel>,
    ) -> Result<CancelableFuture<F>, ExecutionError> {
        Ok(CancelableFuture::new(inner, self.cancel_handle(native)?))
    }

    // === Execution ===

    /// Run the computation.
    ///
    /// Emits `InstanceStart`, then `InstanceEnd` on success or `Failed` on
    /// failure. The audit id is the current request id for the whole call.
    pub fn call(&self) -> Result<StagedContent, ExecutionError> {
        let attachment = self.attached()?;
        request_context::scope_sync(self.audit_id.clone(), || self.run(attachment))
    }

    fn run(&self, attachment: &Attachment) -> Result<StagedContent, ExecutionError> {
        let listener = &attachment.listener;
        let started = Instant::now();
        self.emit(MessageType::InstanceStart, "", 0.0);

        if listener.status() == ExecutionStatus::Canceled {
            debug!(execution_id = %listener.id(), "Skipping canceled execution");
            self.fail(listener);
            return Err(ExecutionError::Canceled);
        }

        let mut output = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.component.execute(&attachment.progress, &mut output)
        }));

        match outcome {
            Ok(Ok(true)) => {
                if listener.status() == ExecutionStatus::Canceled {
                    self.fail(listener);
                    return Err(ExecutionError::Canceled);
                }
                if !listener.status().is_terminal() {
                    listener.complete();
                }
                self.emit(
                    MessageType::InstanceEnd,
                    "",
                    started.elapsed().as_secs_f32(),
                );
                Ok(StagedContent::new(self.component.mime_type(), output))
            }
            Ok(Ok(false)) => {
                self.fail(listener);
                Err(ExecutionError::ComputationFailed)
            }
            Ok(Err(e)) => {
                warn!(execution_id = %listener.id(), error = %e, "Report computation failed");
                self.fail(listener);
                Err(ExecutionError::Computation(e))
            }
            Err(payload) => {
                let message = panic_message(payload);
                warn!(execution_id = %listener.id(), panic = %message, "Report computation panicked");
                self.fail(listener);
                Err(ExecutionError::Panicked(message))
            }
        }
    }

    /// Failure path: mark `Failed` unless canceled, audit without timing.
    fn fail(&self, listener: &StatusListener) {
        listener.on_fail();
        let value = if listener.status() == ExecutionStatus::Canceled {
            CANCELED_AUDIT_VALUE
        } else {
            ""
        };
        self.emit(MessageType::Failed, value, 0.0);
    }

    fn emit(&self, message_type: MessageType, value: &str, duration: f32) {
        let (instance_id, user_name) = session_labels(self.session.as_deref());
        let record = AuditRecord {
            instance_id,
            user_name,
            action_name: self.path.clone(),
            object_type: TASK_TYPE.to_string(),
            process_id: TASK_TYPE.to_string(),
            message_type,
            message: self.audit_id.clone(),
            value: value.to_string(),
            duration,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| self.audit.audit(&record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, %message_type, "Audit sink failed; record dropped"),
            Err(_) => warn!(%message_type, "Audit sink panicked; record dropped"),
        }
    }
}

impl fmt::Display for AsyncExecutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AsyncExecutionTask {{ path: '{}', audit_id: '{}', listener: ",
            self.path, self.audit_id
        )?;
        match self.listener() {
            Some(listener) => write!(f, "{} }}", listener),
            None => f.write_str("none }"),
        }
    }
}

impl fmt::Debug for AsyncExecutionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Refuses once scheduled; otherwise marks the listener canceled.
struct TaskCancelPolicy {
    listener: Arc<StatusListener>,
    path: String,
    requested_by: String,
}

impl TaskCancelPolicy {
    fn log_request(&self) {
        info!(
            execution_id = %self.listener.id(),
            path = %self.path,
            requested_by = %self.requested_by,
            "Report execution canceled"
        );
    }
}

impl CancelPolicy for TaskCancelPolicy {
    fn may_cancel(&self) -> bool {
        !self.listener.is_scheduled()
    }

    fn on_cancel(&self) -> Result<(), ExecutionError> {
        self.log_request();
        self.listener.transition(ExecutionStatus::Canceled)?;
        Ok(())
    }

    fn gate(&self, may_interrupt: bool, native: &dyn NativeCancel) -> Option<bool> {
        let cancelled = self
            .listener
            .cancel_unless_scheduled(may_interrupt, || native.cancel(may_interrupt))?;
        if may_interrupt {
            self.log_request();
        }
        Some(cancelled)
    }
}
