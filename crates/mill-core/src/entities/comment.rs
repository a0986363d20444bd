use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::entities::User;
use crate::ids::{PREFIX_COMMENT, new_id};

/// A comment left on a task. Soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub content: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    #[must_use]
    pub fn create(task_id: &str, content: &str, created_by: &str, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            id: new_id(PREFIX_COMMENT),
            task_id: task_id.to_string(),
            content: content.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A comment with its author loaded (relation `author`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            comment,
            author: None,
        }
    }
}
