//! # mill-db
//!
//! libSQL-backed storage for taskmill.
//!
//! - [`MillDb`]: connection handle, migrations, and the compiler that turns a
//!   planned [`StoreQuery`](mill_core::query::StoreQuery) into SQL
//! - [`service::MillService`]: business operations on users, tasks,
//!   comments, and attachments, each recording an audit entry
//! - [`audit::AuditRecorder`]: bounded queue plus a single writer task so
//!   audit inserts never block or fail the operation that caused them
//! - [`reminder::ReminderScanner`]: periodic due-date scan that notifies
//!   each task's assignee (else creator) once
//!
//! Uses the `libsql` crate (`SQLite` fork, v0.9.29) in local mode, either
//! file-backed or `:memory:`.

pub mod audit;
pub mod error;
pub mod helpers;
mod migrations;
pub mod query;
pub mod reminder;
pub mod repos;
pub mod service;
pub mod updates;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use error::DatabaseError;
use libsql::Builder;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Central database handle.
///
/// Cheap to clone: clones share the same database and connection, so an
/// `:memory:` database stays visible to every clone. Because the connection
/// is shared, any statement issued while a transaction is open joins it;
/// multi-statement writes and the audit writer therefore take the write
/// gate first.
#[derive(Clone)]
pub struct MillDb {
    #[allow(dead_code)]
    db: Arc<libsql::Database>,
    conn: libsql::Connection,
    write_gate: Arc<Mutex<()>>,
}

impl MillDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Must be set per connection in SQLite.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let mill_db = Self {
            db: Arc::new(db),
            conn,
            write_gate: Arc::new(Mutex::new(())),
        };
        mill_db.run_migrations().await?;
        debug!(path, "database opened");
        Ok(mill_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Exclusive access for writes that must not interleave with others on
    /// the shared connection.
    pub async fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }
}
