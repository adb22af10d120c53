//! Status listener: the single mutation point for an execution's status.
//!
//! The worker thread drives the listener through progress callbacks while any
//! number of pollers read it. Every mutator and [`StatusListener::snapshot`]
//! take the same lock, so a reader never sees a half-applied update.

use std::fmt;

use async_report_status::{Activity, ExecutionStatus, StatusError, StatusRecord};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::component::{ProgressEvent, ProgressListener};

/// Tracks the status of one execution attempt.
pub struct StatusListener {
    id: Uuid,
    record: Mutex<StatusRecord>,
}

impl StatusListener {
    /// Create a listener in `Queued` status.
    pub fn new(id: Uuid, path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id,
            record: Mutex::new(StatusRecord::new(id, path, mime_type)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Point-in-time copy of the record.
    pub fn snapshot(&self) -> StatusRecord {
        self.record.lock().clone()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.record.lock().status()
    }

    pub fn is_scheduled(&self) -> bool {
        self.status() == ExecutionStatus::Scheduled
    }

    /// Apply a transition, reporting why it was rejected.
    pub fn transition(&self, to: ExecutionStatus) -> Result<(), StatusError> {
        let mut record = self.record.lock();
        Self::apply(self.id, &mut record, to)
    }

    fn apply(id: Uuid, record: &mut StatusRecord, to: ExecutionStatus) -> Result<(), StatusError> {
        let from = record.status();
        from.try_transition(to)?;
        record.try_set(to);
        debug!(execution_id = %id, %from, %to, "Execution status changed");
        Ok(())
    }

    // === Lifecycle edges ===

    /// `Queued -> Scheduled`. Returns `true` if the status changed.
    pub fn on_scheduled(&self) -> bool {
        self.transition(ExecutionStatus::Scheduled).is_ok()
    }

    pub fn on_processing_started(&self) -> bool {
        self.transition(ExecutionStatus::Working).is_ok()
    }

    /// Record progress while working.
    ///
    /// In first-page mode, a content-generation update for a page past zero
    /// moves the execution to `ContentAvailable`.
    pub fn on_processing_update(&self, event: &ProgressEvent) {
        let mut record = self.record.lock();
        if !record.status().is_working() {
            trace!(execution_id = %self.id, status = %record.status(), "Ignoring progress update");
            return;
        }

        record.record_progress(event.activity, event.percent(), event.page, event.row);

        if record.first_page_mode
            && event.activity == Activity::GeneratingContent
            && event.page > 0
            && record.status() == ExecutionStatus::Working
        {
            // first page is ready
            let _ = Self::apply(self.id, &mut record, ExecutionStatus::ContentAvailable);
        }
    }

    /// Finish the execution. Progress is forced to 100.
    pub fn on_processing_finished(&self, event: &ProgressEvent) -> bool {
        let mut record = self.record.lock();
        if Self::apply(self.id, &mut record, ExecutionStatus::Finished).is_err() {
            return false;
        }
        record.record_progress(event.activity, 100, event.page, event.row);
        true
    }

    /// Finish without a final event from the computation.
    pub fn complete(&self) -> bool {
        let mut record = self.record.lock();
        if Self::apply(self.id, &mut record, ExecutionStatus::Finished).is_err() {
            return false;
        }
        record.progress = 100;
        true
    }

    /// Mark canceled. Sticky from here on.
    pub fn on_cancel(&self) -> bool {
        self.transition(ExecutionStatus::Canceled).is_ok()
    }

    /// Cancel unless the execution is scheduled.
    ///
    /// The scheduled check, the optional `Canceled` transition and `native`
    /// all run under the record lock, so a concurrent [`on_scheduled`] lands
    /// either before (refused) or after (ignored). Returns `None` when refused.
    ///
    /// [`on_scheduled`]: Self::on_scheduled
    pub fn cancel_unless_scheduled<R>(
        &self,
        mark_canceled: bool,
        native: impl FnOnce() -> R,
    ) -> Option<R> {
        let mut record = self.record.lock();
        if record.status() == ExecutionStatus::Scheduled {
            return None;
        }
        if mark_canceled {
            if let Err(e) = Self::apply(self.id, &mut record, ExecutionStatus::Canceled) {
                warn!(execution_id = %self.id, error = %e, "Could not mark execution canceled; ignoring");
            }
        }
        Some(native())
    }

    /// Mark failed, unless the execution was canceled or already ended.
    pub fn on_fail(&self) -> bool {
        self.transition(ExecutionStatus::Failed).is_ok()
    }

    // === Client hints ===

    /// Store the page the client wants first. Ignored once terminal.
    pub fn set_requested_page(&self, page: u32) -> bool {
        let mut record = self.record.lock();
        if record.is_terminal() {
            return false;
        }
        record.requested_page = page;
        true
    }

    pub fn set_first_page_mode(&self, first_page_mode: bool) {
        self.record.lock().first_page_mode = first_page_mode;
    }
}

impl ProgressListener for StatusListener {
    fn processing_started(&self, _event: &ProgressEvent) {
        self.on_processing_started();
    }

    fn processing_update(&self, event: &ProgressEvent) {
        self.on_processing_update(event);
    }

    fn processing_finished(&self, event: &ProgressEvent) {
        self.on_processing_finished(event);
    }
}

impl fmt::Display for StatusListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.snapshot();
        write!(
            f,
            "StatusListener {{ path: '{}', id: {}, status: {}, progress: {}, page: {}, row: {}, activity: '{}' }}",
            r.path,
            r.id(),
            r.status(),
            r.progress,
            r.page,
            r.row,
            r.activity.code()
        )
    }
}

impl fmt::Debug for StatusListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusListener")
            .field("record", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn listener() -> StatusListener {
        StatusListener::new(Uuid::new_v4(), "/public/steel-wheels.prpt", "text/html")
    }

    fn update(activity: Activity, fraction: f64, page: u32, row: u32) -> ProgressEvent {
        ProgressEvent::new(activity, fraction, page, row)
    }

    #[test]
    fn test_happy_path() {
        let listener = listener();
        assert_eq!(listener.status(), ExecutionStatus::Queued);

        assert!(listener.on_processing_started());
        listener.on_processing_update(&update(Activity::ComputingLayout, 0.2, 0, 15));
        assert_eq!(listener.snapshot().progress, 20);

        assert!(listener.on_processing_finished(&update(Activity::GeneratingContent, 0.9, 4, 200)));
        let snap = listener.snapshot();
        assert_eq!(snap.status(), ExecutionStatus::Finished);
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.page, 4);
        assert_eq!(snap.row, 200);
        assert_eq!(snap.activity, Activity::GeneratingContent);
    }

    #[test]
    fn test_scheduled_only_from_queued() {
        let listener = listener();
        assert!(listener.on_scheduled());
        assert!(listener.is_scheduled());
        assert!(!listener.on_scheduled());

        let working = self::listener();
        working.on_processing_started();
        assert!(!working.on_scheduled());
        assert_eq!(working.status(), ExecutionStatus::Working);
    }

    #[test]
    fn test_updates_ignored_unless_working() {
        let listener = listener();
        listener.on_processing_update(&update(Activity::Paginating, 0.5, 1, 10));
        let snap = listener.snapshot();
        assert_eq!(snap.progress, 0);
        assert_eq!(snap.page, 0);
        assert_eq!(snap.status(), ExecutionStatus::Queued);
    }

    #[test]
    fn test_progress_monotonic_and_bounded() {
        let listener = listener();
        listener.on_processing_started();

        let fractions = [0.1, 0.05, 0.4, -2.0, 0.39, 1.7, f64::NAN, 0.99];
        let mut last = 0;
        for (i, fraction) in fractions.iter().enumerate() {
            listener.on_processing_update(&update(Activity::Paginating, *fraction, 1, i as u32));
            let progress = listener.snapshot().progress;
            assert!(progress <= 100);
            assert!(progress >= last, "progress went backwards: {} -> {}", last, progress);
            last = progress;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_cancel_is_sticky() {
        let listener = listener();
        listener.on_processing_started();
        assert!(listener.on_cancel());

        assert!(!listener.on_fail());
        assert!(!listener.on_processing_finished(&update(Activity::GeneratingContent, 1.0, 3, 9)));
        assert!(!listener.complete());
        assert!(!listener.on_processing_started());
        assert!(!listener.on_cancel());
        assert_eq!(listener.status(), ExecutionStatus::Canceled);
        assert_eq!(
            listener.transition(ExecutionStatus::Failed),
            Err(StatusError::Canceled)
        );
    }

    #[test]
    fn test_cancel_from_queued() {
        let listener = listener();
        assert!(listener.on_cancel());
        assert_eq!(listener.status(), ExecutionStatus::Canceled);
    }

    #[test]
    fn test_cancel_refused_when_scheduled() {
        let listener = listener();
        listener.on_scheduled();
        assert!(!listener.on_cancel());
        assert_eq!(listener.status(), ExecutionStatus::Scheduled);
    }

    #[test]
    fn test_guarded_cancel_skips_native_when_scheduled() {
        let listener = listener();
        listener.on_scheduled();

        let mut native_calls = 0;
        let outcome = listener.cancel_unless_scheduled(true, || {
            native_calls += 1;
            true
        });
        assert_eq!(outcome, None);
        assert_eq!(native_calls, 0);
        assert_eq!(listener.status(), ExecutionStatus::Scheduled);
    }

    #[test]
    fn test_guarded_cancel_marks_before_native() {
        let listener = listener();
        let seen = listener.cancel_unless_scheduled(true, || listener.record.is_locked());
        assert_eq!(seen, Some(true));
        assert_eq!(listener.status(), ExecutionStatus::Canceled);

        let quiet = StatusListener::new(Uuid::new_v4(), "/r.prpt", "text/html");
        assert_eq!(quiet.cancel_unless_scheduled(false, || 7), Some(7));
        assert_eq!(quiet.status(), ExecutionStatus::Queued);
    }

    #[test]
    fn test_guarded_cancel_races_schedule_consistently() {
        for _ in 0..200 {
            let listener = Arc::new(listener());
            let barrier = Arc::new(Barrier::new(2));

            let scheduler = {
                let listener = Arc::clone(&listener);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    listener.on_scheduled()
                })
            };
            barrier.wait();
            let cancelled = listener.cancel_unless_scheduled(true, || true);
            let scheduled = scheduler.join().unwrap();

            // exactly one side wins, and the status says which
            match (cancelled, scheduled) {
                (Some(true), false) => assert_eq!(listener.status(), ExecutionStatus::Canceled),
                (None, true) => assert_eq!(listener.status(), ExecutionStatus::Scheduled),
                other => panic!("Inconsistent race outcome: {:?}", other),
            }
        }
    }

    #[test]
    fn test_fail_from_non_terminal() {
        let listener = listener();
        listener.on_scheduled();
        assert!(listener.on_fail());
        assert_eq!(listener.status(), ExecutionStatus::Failed);
        assert!(!listener.on_cancel());
    }

    #[test]
    fn test_first_page_mode_content_available() {
        let listener = listener();
        listener.set_first_page_mode(true);
        listener.on_processing_started();

        listener.on_processing_update(&update(Activity::Paginating, 0.3, 2, 10));
        assert_eq!(listener.status(), ExecutionStatus::Working);

        listener.on_processing_update(&update(Activity::GeneratingContent, 0.5, 2, 40));
        assert_eq!(listener.status(), ExecutionStatus::ContentAvailable);

        // further updates still land
        listener.on_processing_update(&update(Activity::GeneratingContent, 0.7, 3, 60));
        let snap = listener.snapshot();
        assert_eq!(snap.status(), ExecutionStatus::ContentAvailable);
        assert_eq!(snap.page, 3);
        assert_eq!(snap.progress, 70);

        listener.on_processing_finished(&update(Activity::GeneratingContent, 1.0, 5, 90));
        assert_eq!(listener.status(), ExecutionStatus::Finished);
    }

    #[test]
    fn test_content_available_needs_first_page_mode() {
        let listener = listener();
        listener.on_processing_started();
        listener.on_processing_update(&update(Activity::GeneratingContent, 0.5, 2, 40));
        assert_eq!(listener.status(), ExecutionStatus::Working);
    }

    #[test]
    fn test_content_available_needs_page() {
        let listener = listener();
        listener.set_first_page_mode(true);
        listener.on_processing_started();
        listener.on_processing_update(&update(Activity::GeneratingContent, 0.1, 0, 4));
        assert_eq!(listener.status(), ExecutionStatus::Working);
    }

    #[test]
    fn test_requested_page_ignored_when_terminal() {
        let listener = listener();
        assert!(listener.set_requested_page(3));
        assert_eq!(listener.snapshot().requested_page, 3);

        listener.on_fail();
        assert!(!listener.set_requested_page(7));
        assert_eq!(listener.snapshot().requested_page, 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let listener = listener();
        let before = listener.snapshot();
        listener.on_processing_started();
        listener.on_processing_update(&update(Activity::Paginating, 0.5, 1, 1));
        assert_eq!(before.status(), ExecutionStatus::Queued);
        assert_eq!(before.progress, 0);
    }

    #[test]
    fn test_display_includes_state() {
        let listener = listener();
        listener.on_processing_started();
        let text = listener.to_string();
        assert!(text.contains("steel-wheels"));
        assert!(text.contains("WORKING"));
    }

    /// Writer keeps page == row == progress for every update; readers must never
    /// observe those fields out of step.
    #[test]
    fn test_no_torn_snapshots_under_contention() {
        let listener = Arc::new(listener());
        listener.on_processing_started();

        let readers = 4;
        let barrier = Arc::new(Barrier::new(readers + 1));

        let writer = {
            let listener = Arc::clone(&listener);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for step in 1..=100_u32 {
                    listener.on_processing_update(&update(
                        Activity::Paginating,
                        f64::from(step) / 100.0,
                        step,
                        step,
                    ));
                }
            })
        };

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let listener = Arc::clone(&listener);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..2_000 {
                        let snap = listener.snapshot();
                        assert_eq!(snap.page, snap.row);
                        assert_eq!(snap.progress, snap.page);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(listener.snapshot().progress, 100);
    }
}
