//! Status record and activity codes.
//!
//! A `StatusRecord` is the state of one execution attempt. The executor side
//! keeps the authoritative copy behind a lock and hands out clones, so every
//! record a caller holds is a point-in-time snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::ExecutionStatus;

/// Processing phase reported by the rendering computation.
///
/// Serialized as the message code the report viewer translates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "async_computing_layout_title")]
    ComputingLayout,
    #[serde(rename = "async_precomputing_values_title")]
    PrecomputingValues,
    #[serde(rename = "async_paginating_title")]
    Paginating,
    #[serde(rename = "async_generating_content_title")]
    GeneratingContent,
}

impl Activity {
    pub const COMPUTING_LAYOUT: &'static str = "async_computing_layout_title";
    pub const PRECOMPUTING_VALUES: &'static str = "async_precomputing_values_title";
    pub const PAGINATING: &'static str = "async_paginating_title";
    pub const GENERATING_CONTENT: &'static str = "async_generating_content_title";

    /// The message code for this activity (`""` for [`Activity::None`]).
    pub fn code(self) -> &'static str {
        match self {
            Activity::None => "",
            Activity::ComputingLayout => Self::COMPUTING_LAYOUT,
            Activity::PrecomputingValues => Self::PRECOMPUTING_VALUES,
            Activity::Paginating => Self::PAGINATING,
            Activity::GeneratingContent => Self::GENERATING_CONTENT,
        }
    }

    /// Parse a message code. Unknown codes map to `None`.
    pub fn from_code(code: &str) -> Activity {
        match code {
            Self::COMPUTING_LAYOUT => Activity::ComputingLayout,
            Self::PRECOMPUTING_VALUES => Activity::PrecomputingValues,
            Self::PAGINATING => Activity::Paginating,
            Self::GENERATING_CONTENT => Activity::GeneratingContent,
            _ => Activity::None,
        }
    }
}

/// Convert a fractional completion signal into a whole percentage.
///
/// Rounds to the nearest integer and clamps to `[0, 100]`. `NaN` counts as 0.
pub fn percent_from_fraction(fraction: f64) -> u32 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u32
}

/// State of one report execution.
///
/// `id` and `status` are private: the id never changes after creation and the
/// status only moves through [`StatusRecord::try_set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    #[serde(rename = "uuid")]
    id: Uuid,
    /// Logical name of the requested report
    pub path: String,
    pub mime_type: String,
    status: ExecutionStatus,
    /// Percent complete, 0..=100
    pub progress: u32,
    pub page: u32,
    pub row: u32,
    pub activity: Activity,
    /// Page the client asked to see first (0 = none)
    pub requested_page: u32,
    pub first_page_mode: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl StatusRecord {
    /// Create a new record in `Queued` status.
    pub fn new(id: Uuid, path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            path: path.into(),
            mime_type: mime_type.into(),
            status: ExecutionStatus::Queued,
            progress: 0,
            page: 0,
            row: 0,
            activity: Activity::None,
            requested_page: 0,
            first_page_mode: false,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Apply a status transition if the state machine allows it.
    ///
    /// Returns `true` when the status changed. Rejected transitions leave the
    /// record untouched.
    pub fn try_set(&mut self, to: ExecutionStatus) -> bool {
        match self.status.try_transition(to) {
            Ok(next) => {
                self.status = next;
                self.touch();
                true
            }
            Err(_) => false,
        }
    }

    /// Record progress counters. The percentage never moves backwards.
    pub fn record_progress(&mut self, activity: Activity, percent: u32, page: u32, row: u32) {
        self.activity = activity;
        self.progress = self.progress.max(percent.min(100));
        self.page = page;
        self.row = row;
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }
}
