//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use async_report_status::prelude::*;
//! ```

pub use crate::error::StatusError;
pub use crate::record::{Activity, StatusRecord, percent_from_fraction};
pub use crate::state_machine::{is_terminal, validate_transition};
pub use crate::status::ExecutionStatus;
