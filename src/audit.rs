//! Deletion audit trail.
//!
//! Every record removed by a merge or rehash produces an [`AuditEntry`]. The
//! production sink emits structured `tracing` events on a dedicated target so
//! they can be routed separately from operational logs.

use std::sync::Mutex;

use serde::Serialize;

/// Target used for all deletion audit events.
pub const AUDIT_TARGET: &str = "regroup::deletions";

/// What happened to the audited object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditEvent {
    /// A single record was deleted.
    #[serde(rename = "object.delete.executed")]
    DeleteExecuted,
    /// Every record of a model owned by a group was deleted.
    #[serde(rename = "object.delete.bulk_executed")]
    BulkDeleteExecuted,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeleteExecuted => "object.delete.executed",
            Self::BulkDeleteExecuted => "object.delete.bulk_executed",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub event: AuditEvent,
    /// Id of the deleted object, or the owning group for bulk deletions
    pub object_id: i64,
    pub transaction_token: Option<String>,
    /// Model name of the deleted object (e.g. `Group`, `GroupTagValue`)
    pub model: &'static str,
}

impl AuditEntry {
    pub fn deleted(object_id: i64, transaction_token: Option<&str>, model: &'static str) -> Self {
        Self {
            event: AuditEvent::DeleteExecuted,
            object_id,
            transaction_token: transaction_token.map(str::to_string),
            model,
        }
    }

    pub fn bulk_deleted(group_id: i64, transaction_token: Option<&str>, model: &'static str) -> Self {
        Self {
            event: AuditEvent::BulkDeleteExecuted,
            object_id: group_id,
            transaction_token: transaction_token.map(str::to_string),
            model,
        }
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits audit entries as `tracing` events on [`AUDIT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: AUDIT_TARGET,
            event = entry.event.as_str(),
            object_id = entry.object_id,
            transaction_id = entry.transaction_token.as_deref().unwrap_or(""),
            model = entry.model,
            "{}",
            entry.event.as_str()
        );
    }
}

/// Keeps audit entries in memory; used by tests and the admin CLI dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries in insertion order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poison) => poison.into_inner().push(entry),
        }
    }
}
