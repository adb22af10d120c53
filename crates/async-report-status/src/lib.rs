//! # Async Report Status
//!
//! **Status model for asynchronous report executions.**
//!
//! A report execution moves through a small lifecycle while a worker renders it
//! and pollers watch it from other threads. This crate holds the pieces of that
//! lifecycle that carry no runtime handles: the status enum, the transition
//! rules and the serializable status record handed to pollers.
//!
//! ## Quick Start
//!
//! ```rust
//! use async_report_status::prelude::*;
//! use uuid::Uuid;
//!
//! let mut record = StatusRecord::new(Uuid::new_v4(), "/public/sales.prpt", "text/html");
//! assert_eq!(record.status(), ExecutionStatus::Queued);
//!
//! assert!(record.try_set(ExecutionStatus::Working));
//! record.record_progress(Activity::Paginating, percent_from_fraction(0.5), 1, 40);
//!
//! // Cancellation is sticky
//! assert!(record.try_set(ExecutionStatus::Canceled));
//! assert!(!record.try_set(ExecutionStatus::Finished));
//! assert_eq!(record.status(), ExecutionStatus::Canceled);
//! ```
//!
//! ## Architecture
//!
//! - **`ExecutionStatus`**: lifecycle enum, serialized in upper snake case
//! - **State machine**: the single place transition rules live
//! - **`StatusRecord`**: snapshot model (serializable, camelCase on the wire)

pub mod error;
pub mod prelude;
pub mod record;
pub mod state_machine;
pub mod status;

pub use error::StatusError;
pub use record::{Activity, StatusRecord, percent_from_fraction};
pub use state_machine::{is_terminal, validate_transition};
pub use status::ExecutionStatus;
