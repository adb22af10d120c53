//! Tokio-based report executor: a bounded worker pool keyed by execution id.
//!
//! Each accepted task gets a fresh id and a listener, then runs on tokio's
//! blocking pool once a permit from the pool semaphore is free. The executor
//! keeps the listener and a cancel handle per id so pollers can read status
//! snapshots and request cancellation from anywhere.

use std::collections::HashMap;
use std::sync::Arc;

use async_report_status::StatusRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info_span};
use uuid::Uuid;

use crate::cancel::{CancelHandle, CancelableFuture, TaskAbort};
use crate::component::{ProgressListener, StagedContent};
use crate::error::ExecutionError;
use crate::listener::StatusListener;
use crate::task::AsyncExecutionTask;

/// Future returned for a submitted task.
///
/// Resolves to `Err(JoinError)` once cancelled; the execution's status is then
/// `Canceled` unless it had already ended.
pub type ReportFuture = CancelableFuture<JoinHandle<Result<StagedContent, ExecutionError>>>;

/// Configuration for [`AsyncReportExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Executions allowed to render at once (0 is treated as 1)
    pub pool_size: usize,
    /// Maximum number of ids tracked at once (0 = unlimited)
    pub max_tracked_tasks: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_tracked_tasks: 10_000,
        }
    }
}

impl ExecutorConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_max_tracked_tasks(mut self, max_tracked_tasks: usize) -> Self {
        self.max_tracked_tasks = max_tracked_tasks;
        self
    }
}

struct ExecutionEntry {
    listener: Arc<StatusListener>,
    cancel: CancelHandle,
}

/// Marks the listener canceled if the worker future is dropped before it
/// completes, which only happens when its task is aborted.
struct AbortGuard {
    listener: Option<Arc<StatusListener>>,
}

impl AbortGuard {
    fn new(listener: Arc<StatusListener>) -> Self {
        Self {
            listener: Some(listener),
        }
    }

    fn disarm(mut self) {
        self.listener = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            if listener.on_cancel() {
                debug!(execution_id = %listener.id(), "Aborted execution marked canceled");
            }
        }
    }
}

/// In-process report executor.
pub struct AsyncReportExecutor {
    entries: Arc<RwLock<HashMap<Uuid, ExecutionEntry>>>,
    permits: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl AsyncReportExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(config.pool_size.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    // === Submission ===

    /// Queue a task and start it once a worker is free.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn add_task(
        &self,
        task: AsyncExecutionTask,
    ) -> Result<(Uuid, ReportFuture), ExecutionError> {
        self.add_task_with(task, Vec::new()).await
    }

    /// Like [`add_task`](Self::add_task), also forwarding progress to `extra`.
    pub async fn add_task_with(
        &self,
        task: AsyncExecutionTask,
        extra: Vec<Arc<dyn ProgressListener>>,
    ) -> Result<(Uuid, ReportFuture), ExecutionError> {
        let mut entries = self.entries.write().await;

        let max = self.config.max_tracked_tasks;
        if max > 0 && entries.len() >= max {
            return Err(ExecutionError::TooManyTasks(max));
        }

        let id = Uuid::new_v4();
        let listener = task.notify_task_queued_with(id, extra)?;
        let policy = task.cancel_policy()?;

        let span = info_span!("report_execution", execution_id = %id, path = %task.path());
        let permits = Arc::clone(&self.permits);
        let guard = AbortGuard::new(Arc::clone(&listener));

        let join = tokio::spawn(
            async move {
                let outcome = async move {
                    let permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| ExecutionError::ExecutorShutdown)?;
                    let span = Span::current();
                    tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        span.in_scope(|| task.call())
                    })
                    .await?
                }
                .await;
                guard.disarm();
                outcome
            }
            .instrument(span),
        );

        let cancel = CancelHandle::new(policy, Arc::new(TaskAbort::new(join.abort_handle())));
        entries.insert(
            id,
            ExecutionEntry {
                listener,
                cancel: cancel.clone(),
            },
        );

        debug!(execution_id = %id, tracked = entries.len(), "Report execution submitted");
        Ok((id, CancelableFuture::new(join, cancel)))
    }

    // === Polling ===

    /// Snapshot of an execution's status, or `None` for unknown ids.
    pub async fn get_status(&self, id: Uuid) -> Option<StatusRecord> {
        let entries = self.entries.read().await;
        entries.get(&id).map(|e| e.listener.snapshot())
    }

    /// Snapshots of every tracked execution.
    pub async fn statuses(&self) -> Vec<StatusRecord> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.listener.snapshot()).collect()
    }

    pub async fn tracked_count(&self) -> usize {
        self.entries.read().await.len()
    }

    // === Control ===

    /// Cancel through the execution's policy gate. `false` for unknown ids.
    pub async fn cancel(&self, id: Uuid, may_interrupt: bool) -> bool {
        let handle = {
            let entries = self.entries.read().await;
            match entries.get(&id) {
                Some(entry) => entry.cancel.clone(),
                None => return false,
            }
        };
        handle.cancel(may_interrupt)
    }

    /// Move an execution to `Scheduled`. Returns whether it is now scheduled.
    pub async fn schedule(&self, id: Uuid) -> bool {
        let entries = self.entries.read().await;
        match entries.get(&id) {
            Some(entry) => {
                entry.listener.on_scheduled();
                entry.listener.is_scheduled()
            }
            None => false,
        }
    }

    /// Forward a requested-page hint. `false` for unknown or terminal executions.
    pub async fn request_page(&self, id: Uuid, page: u32) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(&id)
            .is_some_and(|e| e.listener.set_requested_page(page))
    }

    // === Eviction ===

    /// Stop tracking an execution. Does not cancel it.
    pub async fn evict(&self, id: Uuid) -> bool {
        let removed = self.entries.write().await.remove(&id).is_some();
        if removed {
            debug!(execution_id = %id, "Evicted report execution");
        }
        removed
    }

    /// Stop tracking every execution in a terminal status. Returns their ids.
    pub async fn evict_terminal(&self) -> Vec<Uuid> {
        let mut entries = self.entries.write().await;
        let done: Vec<Uuid> = entries
            .iter()
            .filter(|(_, e)| {
                // aborted before its worker settled it
                if e.cancel.is_cancelled() {
                    e.listener.on_cancel();
                }
                e.listener.status().is_terminal()
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &done {
            entries.remove(id);
        }
        if !done.is_empty() {
            debug!(count = done.len(), "Evicted terminal report executions");
        }
        done
    }
}

impl Default for AsyncReportExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
