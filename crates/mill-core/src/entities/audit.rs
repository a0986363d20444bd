use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::diff::DiffRecord;
use crate::enums::{AuditAction, AuditScope};

/// An append-only audit trail entry.
///
/// Built only by the audit recorder; never mutated or deleted once stored.
/// `performed_by` is `None` for system-originated actions such as reminders.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AuditEntry {
    pub id: String,
    pub scope: AuditScope,
    pub scope_id: String,
    pub action: AuditAction,
    pub performed_by: Option<String>,
    pub details: Option<String>,
    pub changes: Option<DiffRecord>,
    pub created_at: DateTime<Utc>,
}
