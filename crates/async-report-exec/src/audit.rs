//! Audit records emitted around an execution's lifecycle.
//!
//! Every call of a task emits one `InstanceStart` record, then either
//! `InstanceEnd` (timed) or `Failed` (untimed). Sinks are best-effort
//! telemetry: the task discards any error they return.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::error::AuditError;
use crate::request_context;

/// Kind of audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    InstanceStart,
    InstanceEnd,
    Failed,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::InstanceStart => "instance_start",
            MessageType::InstanceEnd => "instance_end",
            MessageType::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Session id of the requester
    pub instance_id: String,
    pub user_name: String,
    /// Logical path of the report
    pub action_name: String,
    pub object_type: String,
    pub process_id: String,
    pub message_type: MessageType,
    /// Audit id of the execution
    pub message: String,
    pub value: String,
    /// Elapsed seconds; 0 for everything but `InstanceEnd`
    pub duration: f32,
}

/// Destination for audit records. Called from worker threads.
pub trait AuditSink: Send + Sync {
    fn audit(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn audit(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event, tagged with the
/// request id of the running execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn audit(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let request_id = request_context::current_request_id().unwrap_or_default();
        info!(
            request_id = %request_id,
            instance_id = %record.instance_id,
            user = %record.user_name,
            action = %record.action_name,
            message_type = %record.message_type,
            audit_id = %record.message,
            value = %record.value,
            duration = record.duration,
            "audit"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Records of the given type, in emission order.
    pub fn of_type(&self, message_type: MessageType) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.message_type == message_type)
            .cloned()
            .collect()
    }

    pub fn count(&self, message_type: MessageType) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.message_type == message_type)
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn audit(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
