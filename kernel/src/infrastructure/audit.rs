use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::apply::ChangeType;

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A file change was written to disk.
    ChangeApplied {
        /// Record id.
        record_id: Uuid,
        /// Affected file.
        path: PathBuf,
        /// Kind of change.
        change_type: ChangeType,
        /// Batch the change belongs to, if any.
        batch_id: Option<Uuid>,
    },
    /// A recorded change was reverted.
    ChangeUndone {
        /// Record id.
        record_id: Uuid,
        /// Affected file.
        path: PathBuf,
    },
    /// A batch failed or was cancelled and its completed steps were reverted.
    BatchRolledBack {
        /// Batch id.
        batch_id: Uuid,
        /// Why the batch stopped.
        reason: String,
        /// Steps that could not be reverted.
        rollback_failures: usize,
    },
    /// Expired backups were removed.
    BackupsPruned {
        /// Number of files removed.
        removed: usize,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    // Serialize to JSON for machine-readable audit logs
    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Change Audit Event");
}
