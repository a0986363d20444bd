//! Status enums, audit scopes, audit actions, and sort direction.
//!
//! Task enums use `snake_case` serialization. Audit enums serialize in
//! `SCREAMING_SNAKE_CASE` because they are stored and exposed verbatim as
//! log vocabulary (`REMINDER_SENT`, `TASK`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Status of a task. Any status may follow any other, so finished tasks can
/// be reopened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskPriority
// ---------------------------------------------------------------------------

/// Priority level of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// What happened to the entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Viewed,
    Commented,
    Assigned,
    Completed,
    AttachmentAdded,
    ReminderSent,
    Uploaded,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
            Self::Viewed => "VIEWED",
            Self::Commented => "COMMENTED",
            Self::Assigned => "ASSIGNED",
            Self::Completed => "COMPLETED",
            Self::AttachmentAdded => "ATTACHMENT_ADDED",
            Self::ReminderSent => "REMINDER_SENT",
            Self::Uploaded => "UPLOADED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditScope
// ---------------------------------------------------------------------------

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditScope {
    Task,
    Comment,
    User,
}

impl AuditScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Comment => "COMMENT",
            Self::User => "USER",
        }
    }
}

impl fmt::Display for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SortOrder
// ---------------------------------------------------------------------------

/// Sort direction for paginated queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse a caller-supplied direction. Only a case-insensitive `"asc"`
    /// selects ascending order; anything else (including garbage) is `Desc`.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn audit_action_serializes_as_log_vocabulary() {
        let json = serde_json::to_value(AuditAction::ReminderSent).unwrap();
        assert_eq!(json, serde_json::json!("REMINDER_SENT"));
        let json = serde_json::to_value(AuditAction::AttachmentAdded).unwrap();
        assert_eq!(json, serde_json::json!(AuditAction::AttachmentAdded.as_str()));
    }

    #[test]
    fn as_str_matches_serde_for_statuses() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json.as_str(), Some(status.as_str()));
        }
    }

    #[rstest]
    #[case("ASC", SortOrder::Asc)]
    #[case("asc", SortOrder::Asc)]
    #[case(" Asc ", SortOrder::Asc)]
    #[case("DESC", SortOrder::Desc)]
    #[case("sideways", SortOrder::Desc)]
    #[case("", SortOrder::Desc)]
    fn sort_order_is_desc_unless_asc(#[case] input: &str, #[case] expected: SortOrder) {
        assert_eq!(SortOrder::parse_lenient(input), expected);
    }
}
