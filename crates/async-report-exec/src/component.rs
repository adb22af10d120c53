//! The rendering computation boundary.
//!
//! A [`ReportComponent`] is opaque to this crate: it renders into a byte buffer,
//! reports progress through a [`ProgressListener`] and returns whether it
//! succeeded. Events arrive on the thread that runs `execute`, in the order
//! started, update*, finished.

use std::sync::Arc;

use async_report_status::{Activity, percent_from_fraction};
use bytes::Bytes;

use crate::error::ComponentError;

/// One progress notification from the computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub activity: Activity,
    /// Fraction of work done, nominally `0.0..=1.0`
    pub fraction: f64,
    pub page: u32,
    pub row: u32,
}

impl ProgressEvent {
    pub fn new(activity: Activity, fraction: f64, page: u32, row: u32) -> Self {
        Self {
            activity,
            fraction,
            page,
            row,
        }
    }

    /// Event with no progress, used for `processing_started`.
    pub fn started() -> Self {
        Self::new(Activity::None, 0.0, 0, 0)
    }

    /// Completion as a whole percentage clamped to `[0, 100]`.
    pub fn percent(&self) -> u32 {
        percent_from_fraction(self.fraction)
    }
}

/// Observer of rendering progress.
pub trait ProgressListener: Send + Sync {
    fn processing_started(&self, event: &ProgressEvent);
    fn processing_update(&self, event: &ProgressEvent);
    fn processing_finished(&self, event: &ProgressEvent);
}

/// The opaque rendering computation.
pub trait ReportComponent: Send + Sync {
    /// MIME type of the content this component produces.
    fn mime_type(&self) -> String;

    /// Render the report into `output`.
    ///
    /// `Ok(false)` and `Err(_)` both count as failure.
    fn execute(
        &self,
        progress: &dyn ProgressListener,
        output: &mut Vec<u8>,
    ) -> Result<bool, ComponentError>;
}

/// Rendered output handed back to the caller of a finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedContent {
    pub mime_type: String,
    pub data: Bytes,
}

impl StagedContent {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Size of the content in bytes.
    pub fn content_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Forwards every event to a list of listeners, in order.
#[derive(Clone, Default)]
pub struct ProgressFanout {
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl ProgressFanout {
    pub fn new(listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        Self { listeners }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ProgressListener for ProgressFanout {
    fn processing_started(&self, event: &ProgressEvent) {
        for listener in &self.listeners {
            listener.processing_started(event);
        }
    }

    fn processing_update(&self, event: &ProgressEvent) {
        for listener in &self.listeners {
            listener.processing_update(event);
        }
    }

    fn processing_finished(&self, event: &ProgressEvent) {
        for listener in &self.listeners {
            listener.processing_finished(event);
        }
    }
}
