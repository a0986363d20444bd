use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::entities::{Attachment, Comment, User};
use crate::enums::{TaskPriority, TaskStatus};
use crate::ids::{PREFIX_TASK, new_id};

/// A tracked work item with an optional due date.
///
/// `reminder_sent` starts `false` and is flipped exactly once by the reminder
/// scanner. Nothing resets it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub assignee_id: Option<String>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<String>,
}

impl NewTask {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Task {
    #[must_use]
    pub fn create(input: NewTask, created_by: &str, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            id: new_id(PREFIX_TASK),
            title: input.title,
            description: input.description,
            status: input.status.unwrap_or_default(),
            priority: input.priority.unwrap_or_default(),
            due_date: input.due_date,
            created_by: created_by.to_string(),
            assignee_id: input.assignee_id,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a reminder should fire for this task given the lookahead
    /// threshold (`now + lookahead`).
    #[must_use]
    pub fn reminder_due(&self, threshold: DateTime<Utc>) -> bool {
        !self.reminder_sent
            && !self.is_deleted()
            && self.due_date.is_some_and(|due| due <= threshold)
    }
}

/// A task with whichever relations the query asked for.
///
/// Relation fields are `None` when not requested, so "not loaded" and
/// "loaded but empty" stay distinguishable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            task,
            assignee: None,
            creator: None,
            comments: None,
            attachments: None,
        }
    }
}

impl TaskView {
    /// The user a notification about this task should go to: the assignee
    /// when loaded, otherwise the creator.
    #[must_use]
    pub fn recipient(&self) -> Option<&User> {
        self.assignee.as_ref().or(self.creator.as_ref())
    }
}

/// List shape of a task: relation collections replaced by their sizes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    pub comment_count: usize,
    pub attachment_count: usize,
}

impl From<TaskView> for TaskSummary {
    fn from(view: TaskView) -> Self {
        Self {
            comment_count: view.comments.as_ref().map_or(0, Vec::len),
            attachment_count: view.attachments.as_ref().map_or(0, Vec::len),
            task: view.task,
            assignee: view.assignee,
            creator: view.creator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn create_assigns_identity_and_defaults() {
        let clock = clock();
        let task = Task::create(NewTask::titled("Write docs"), "usr-1", &clock);

        assert!(task.id.starts_with("tsk-"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Low);
        assert!(!task.reminder_sent);
        assert_eq!(task.created_at, clock.now());
        assert_eq!(task.updated_at, clock.now());
        assert!(task.deleted_at.is_none());
    }

    #[test]
    fn reminder_due_respects_flag_and_threshold() {
        let clock = clock();
        let now = clock.now();
        let mut task = Task::create(
            NewTask {
                due_date: Some(now + Duration::minutes(10)),
                ..NewTask::titled("Call vendor")
            },
            "usr-1",
            &clock,
        );

        assert!(task.reminder_due(now + Duration::minutes(15)));
        assert!(!task.reminder_due(now + Duration::minutes(5)));

        task.reminder_sent = true;
        assert!(!task.reminder_due(now + Duration::minutes(15)));
    }

    #[test]
    fn summary_counts_loaded_relations() {
        let clock = clock();
        let task = Task::create(NewTask::titled("Ship"), "usr-1", &clock);
        let comment = Comment::create(&task.id, "looks good", "usr-1", &clock);
        let view = TaskView {
            comments: Some(vec![comment.clone(), comment]),
            ..TaskView::from(task)
        };

        let summary = TaskSummary::from(view);
        assert_eq!(summary.comment_count, 2);
        assert_eq!(summary.attachment_count, 0);
    }
}
