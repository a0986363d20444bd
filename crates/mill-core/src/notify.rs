//! Outbound notification capability.
//!
//! Rendering and transport belong to the implementor. The core only names a
//! template and hands over a JSON context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::entities::{Task, User};

pub const TEMPLATE_TASK_REMINDER: &str = "task-reminder";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub template: String,
    pub context: Value,
}

impl Notification {
    /// Reminder that `task` is nearly due, addressed to `user`.
    #[must_use]
    pub fn task_reminder(user: &User, task: &Task) -> Self {
        Self {
            recipient: Recipient::from(user),
            template: TEMPLATE_TASK_REMINDER.to_string(),
            context: json!({
                "name": user.first_name,
                "task": {
                    "id": task.id,
                    "title": task.title,
                    "description": task.description,
                    "due_date": task.due_date,
                    "priority": task.priority,
                    "status": task.status,
                },
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification rejected: {0}")]
    Rejected(String),

    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Sends a templated message to one recipient.
///
/// Implementations are expected to bound their own latency; callers do not
/// wrap `send` in a timeout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::entities::{NewTask, NewUser};
    use chrono::{TimeZone, Utc};

    #[test]
    fn reminder_carries_task_context() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
        let user = User::create(
            NewUser {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.com".into(),
            },
            &clock,
        );
        let task = Task::create(
            NewTask {
                due_date: Some(clock.now()),
                ..NewTask::titled("Review engine notes")
            },
            &user.id,
            &clock,
        );

        let n = Notification::task_reminder(&user, &task);
        assert_eq!(n.template, "task-reminder");
        assert_eq!(n.recipient.email, "ada@example.com");
        assert_eq!(n.context["name"], "Ada");
        assert_eq!(n.context["task"]["title"], "Review engine notes");
        assert_eq!(n.context["task"]["id"], task.id.as_str());
    }
}
