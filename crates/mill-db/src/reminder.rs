//! Due-date reminder scanner.
//!
//! Each tick selects live tasks due within the lookahead window whose
//! reminder flag is still clear, notifies the assignee (else the creator),
//! then sets the flag and records `REMINDER_SENT`. A failed notification
//! leaves the flag clear so the next tick retries it. A crash between a
//! successful send and the flag write can repeat one reminder; nothing can
//! send one twice otherwise.
//!
//! Assumes a single scanner per database. Overlapping ticks in one process
//! are refused, not queued.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use mill_config::ReminderConfig;
use mill_core::clock::Clock;
use mill_core::entities::TaskView;
use mill_core::enums::{AuditAction, AuditScope, SortOrder};
use mill_core::notify::{Notification, Notifier};
use mill_core::query::{Predicate, QueryStore, StoreQuery, TASKS};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::MillDb;
use crate::audit::{AuditEvent, AuditRecorder};
use crate::error::DatabaseError;
use crate::service::MillService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub interval: Duration,
    pub lookahead: chrono::Duration,
    pub batch_size: u32,
    pub concurrency: usize,
}

impl From<&ReminderConfig> for ReminderSettings {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            interval: config.interval(),
            lookahead: chrono::Duration::minutes(i64::from(config.lookahead_minutes)),
            batch_size: config.batch_size,
            concurrency: config.concurrency.max(1),
        }
    }
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self::from(&ReminderConfig::default())
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tasks selected as due.
    pub candidates: usize,
    pub sent: usize,
    /// Tasks left pending for the next tick.
    pub failed: usize,
    /// Another tick was still running, so this one did nothing.
    pub skipped: bool,
}

enum Outcome {
    Sent,
    Failed,
}

pub struct ReminderScanner {
    db: MillDb,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: ReminderSettings,
    running: Mutex<()>,
}

impl ReminderScanner {
    #[must_use]
    pub fn new(
        db: MillDb,
        audit: AuditRecorder,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            db,
            audit,
            notifier,
            clock,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Scanner sharing the service's database, audit writer, and clock.
    #[must_use]
    pub fn for_service(
        service: &MillService,
        notifier: Arc<dyn Notifier>,
        settings: ReminderSettings,
    ) -> Self {
        Self::new(
            service.db().clone(),
            service.audit().clone(),
            notifier,
            service.clock_handle(),
            settings,
        )
    }

    #[must_use]
    pub const fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Run one scan. Safe to call from outside the timer loop.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` only if the candidate query fails. Failures
    /// for individual tasks are logged and counted in the report.
    pub async fn tick(&self) -> Result<TickReport, DatabaseError> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("reminder tick already in progress; skipping");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        };

        let threshold = self.clock.now() + self.settings.lookahead;
        let query = StoreQuery::all(&TASKS)
            .filter(Predicate::is_not_null("due_date"))
            .filter(Predicate::le("due_date", threshold))
            .filter(Predicate::eq("reminder_sent", false))
            .order_by("due_date", SortOrder::Asc)
            .with_relations(["assignee", "creator"])
            .take(self.settings.batch_size);
        let (due, _) = QueryStore::<TaskView>::fetch(&self.db, &query).await?;

        let pending: Vec<_> = due.iter().map(|view| self.remind(view)).collect();
        let outcomes: Vec<Outcome> = stream::iter(pending)
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let sent = outcomes.iter().filter(|o| matches!(o, Outcome::Sent)).count();
        let report = TickReport {
            candidates: due.len(),
            sent,
            failed: outcomes.len() - sent,
            skipped: false,
        };
        if report.candidates > 0 {
            info!(
                candidates = report.candidates,
                sent = report.sent,
                failed = report.failed,
                "reminder tick finished"
            );
        }
        Ok(report)
    }

    /// Tick on the configured interval until `cancel` fires. Cancellation is
    /// observed between ticks; a tick in progress always completes.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.settings.interval.as_secs(),
            lookahead_minutes = self.settings.lookahead.num_minutes(),
            "reminder scanner started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "reminder tick failed");
            }
        }
        info!("reminder scanner stopped");
    }

    async fn remind(&self, view: &TaskView) -> Outcome {
        let task_id = view.task.id.as_str();
        let Some(user) = view.recipient() else {
            warn!(task_id, "task has no reachable assignee or creator; reminder left pending");
            return Outcome::Failed;
        };

        let notification = Notification::task_reminder(user, &view.task);
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(task_id, recipient = %user.email, error = %e, "reminder delivery failed; will retry");
            return Outcome::Failed;
        }

        match self.db.mark_reminder_sent(task_id, self.clock.now()).await {
            Ok(true) => {
                self.audit.record(
                    AuditEvent::new(AuditScope::Task, task_id, AuditAction::ReminderSent)
                        .details(format!("reminder sent to {}", user.email)),
                );
                debug!(task_id, recipient = %user.email, "reminder sent");
                Outcome::Sent
            }
            Ok(false) => {
                warn!(task_id, "reminder flag was already set by another writer");
                Outcome::Sent
            }
            Err(e) => {
                error!(task_id, error = %e, "reminder sent but flag write failed; it may repeat");
                Outcome::Failed
            }
        }
    }
}
