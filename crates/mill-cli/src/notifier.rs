//! Notifier used by the binary until a mail transport is configured: every
//! reminder becomes a structured log line.

use async_trait::async_trait;
use mill_core::notify::{Notification, Notifier, NotifyError};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let task = &notification.context["task"];
        info!(
            template = %notification.template,
            recipient = %notification.recipient.email,
            task_id = task["id"].as_str().unwrap_or_default(),
            title = task["title"].as_str().unwrap_or_default(),
            due_date = task["due_date"].as_str().unwrap_or_default(),
            "reminder"
        );
        Ok(())
    }
}
