//! Asynchronous audit log writer.
//!
//! Business operations call [`AuditRecorder::record`], which stamps the entry,
//! diffs any before/after snapshots it carries, and hands it to a bounded queue without waiting for the insert. One worker
//! task owns the receiving end and writes entries in the order they were
//! queued. Write failures are logged and counted; they never reach the
//! operation that produced the entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mill_core::clock::Clock;
use mill_core::diff::diff;
use mill_core::entities::AuditEntry;
use mill_core::enums::{AuditAction, AuditScope};
use mill_core::errors::CoreError;
use mill_core::ids::{PREFIX_AUDIT, new_id};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::MillDb;
use crate::error::DatabaseError;

/// What happened, before the recorder assigns identity and time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub scope: AuditScope,
    pub scope_id: String,
    pub action: AuditAction,
    pub performed_by: Option<String>,
    pub details: Option<String>,
    /// Entity state before and after the operation.
    pub snapshots: Option<(Value, Value)>,
}

impl AuditEvent {
    pub fn new(scope: AuditScope, scope_id: impl Into<String>, action: AuditAction) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
            action,
            performed_by: None,
            details: None,
            snapshots: None,
        }
    }

    #[must_use]
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.performed_by = Some(actor.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach the entity's state before and after the operation.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Other` if either value fails to serialize.
    pub fn snapshots<T: Serialize>(mut self, before: &T, after: &T) -> Result<Self, CoreError> {
        let before = serde_json::to_value(before).map_err(|e| CoreError::Other(e.into()))?;
        let after = serde_json::to_value(after).map_err(|e| CoreError::Other(e.into()))?;
        self.snapshots = Some((before, after));
        Ok(self)
    }
}

/// Counters since the recorder was spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

enum Command {
    Write(AuditEntry),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the audit writer. Clones share one queue and one worker.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<Command>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AuditRecorder {
    /// Start the writer task on the current tokio runtime.
    ///
    /// `capacity` bounds the number of entries waiting to be written.
    #[must_use]
    pub fn spawn(db: MillDb, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(run_worker(db, rx, Arc::clone(&counters)));
        Self {
            tx,
            clock,
            counters,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Stamp `event` and queue it for writing. Returns the entry as it will
    /// be stored.
    ///
    /// Never waits on the database. If the queue is full or the worker has
    /// shut down, the entry is dropped with a warning and counted.
    pub fn record(&self, event: AuditEvent) -> AuditEntry {
        let entry = AuditEntry {
            id: new_id(PREFIX_AUDIT),
            scope: event.scope,
            scope_id: event.scope_id,
            action: event.action,
            performed_by: event.performed_by,
            details: event.details,
            changes: event
                .snapshots
                .and_then(|(before, after)| diff(&before, &after)),
            created_at: self.clock.now(),
        };

        match self.tx.try_send(Command::Write(entry.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    audit_id = %entry.id,
                    scope = %entry.scope,
                    scope_id = %entry.scope_id,
                    action = %entry.action,
                    "audit queue full; entry dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    "audit writer stopped; entry dropped"
                );
            }
        }
        entry
    }

    #[must_use]
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Wait until every entry queued before this call has been written or
    /// has failed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidState` if the worker has stopped.
    pub async fn flush(&self) -> Result<(), DatabaseError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| stopped())?;
        done_rx.await.map_err(|_| stopped())
    }

    /// Stop accepting entries, write everything already queued, and wait for
    /// the worker to exit. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let Some(handle) = self.worker.lock().await.take() else {
            return;
        };
        if self.tx.send(Command::Shutdown).await.is_err() {
            debug!("audit writer already stopped");
        }
        if let Err(e) = handle.await {
            error!(error = %e, "audit writer task panicked");
        }
    }
}

fn stopped() -> DatabaseError {
    DatabaseError::InvalidState("audit writer is not running".into())
}

async fn run_worker(db: MillDb, mut rx: mpsc::Receiver<Command>, counters: Arc<Counters>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Write(entry) => write_entry(&db, &entry, &counters).await,
            Command::Flush(done) => {
                let _ = done.send(());
            }
            // Entries already queued are still delivered before `recv`
            // returns `None`.
            Command::Shutdown => rx.close(),
        }
    }
    debug!("audit writer stopped");
}

async fn write_entry(db: &MillDb, entry: &AuditEntry, counters: &Counters) {
    let written = {
        let _gate = db.write_gate().await;
        db.append_audit(entry).await
    };
    match written {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                audit_id = %entry.id,
                scope = %entry.scope,
                scope_id = %entry.scope_id,
                action = %entry.action,
                error = %e,
                "audit write failed"
            );
        }
    }
}
