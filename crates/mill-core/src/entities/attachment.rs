use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::ids::{PREFIX_ATTACHMENT, new_id};

/// Metadata for a file attached to a task. The bytes live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub task_id: String,
    pub original_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_path: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata handed over by the upload layer for one stored file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NewAttachment {
    pub original_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_path: String,
}

impl Attachment {
    #[must_use]
    pub fn create(
        task_id: &str,
        input: NewAttachment,
        created_by: &str,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        Self {
            id: new_id(PREFIX_ATTACHMENT),
            task_id: task_id.to_string(),
            original_name: input.original_name,
            file_name: input.file_name,
            mime_type: input.mime_type,
            file_path: input.file_path,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
