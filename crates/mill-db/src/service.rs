//! Service layer: business operations with audit recording.
//!
//! `MillService` wraps `MillDb` (raw store access), the `AuditRecorder`
//! (asynchronous audit writes), a `Clock`, and the `QueryEngine`. The
//! operations themselves are implemented as `impl MillService` blocks in
//! `repos/`.
//!
//! Every mutation follows the same protocol:
//! 1. Read the current row (the "before" snapshot) where one exists
//! 2. Execute the write
//! 3. Re-read the row (the "after" snapshot)
//! 4. Diff the snapshots and hand an `AuditEvent` to the recorder, which
//!    returns immediately

use std::path::Path;
use std::sync::Arc;

use mill_config::{MillConfig, QueryConfig};
use mill_core::clock::Clock;
use mill_core::errors::CoreError;
use mill_core::query::{QueryEngine, QueryParams, QuerySpec};

use crate::MillDb;
use crate::audit::AuditRecorder;
use crate::error::DatabaseError;

pub struct MillService {
    db: MillDb,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    engine: QueryEngine,
    default_limit: u32,
}

impl MillService {
    /// Wrap an open database and a running recorder, with default paging.
    #[must_use]
    pub fn new(db: MillDb, audit: AuditRecorder, clock: Arc<dyn Clock>) -> Self {
        Self::with_query_config(db, audit, clock, &QueryConfig::default())
    }

    #[must_use]
    pub fn with_query_config(
        db: MillDb,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
        query: &QueryConfig,
    ) -> Self {
        Self {
            db,
            audit,
            clock,
            engine: QueryEngine::with_max_limit(query.max_limit),
            default_limit: query.default_limit,
        }
    }

    /// Open the configured database and start its audit writer.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database directory cannot be created,
    /// the database cannot be opened, or migrations fail.
    pub async fn open(config: &MillConfig, clock: Arc<dyn Clock>) -> Result<Self, DatabaseError> {
        if let Some(dir) = config.database.parent_dir() {
            create_dir(&dir)?;
        }
        let db = MillDb::open_local(&config.database.path).await?;
        let audit = AuditRecorder::spawn(db.clone(), Arc::clone(&clock), config.audit.queue_capacity);
        Ok(Self::with_query_config(db, audit, clock, &config.query))
    }

    #[must_use]
    pub const fn db(&self) -> &MillDb {
        &self.db
    }

    #[must_use]
    pub const fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Shared handle to the clock, for components that outlive a borrow.
    #[must_use]
    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    #[must_use]
    pub const fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Turn raw caller input into a validated spec, applying the configured
    /// page size when the caller gave none.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Validation` for malformed paging or dates.
    pub fn query_spec(&self, mut params: QueryParams) -> Result<QuerySpec, DatabaseError> {
        if params.limit.is_none() {
            params.limit = Some(i64::from(self.default_limit));
        }
        Ok(QuerySpec::try_from(params)?)
    }
}

fn create_dir(dir: &Path) -> Result<(), DatabaseError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        DatabaseError::Other(anyhow::anyhow!(
            "cannot create database directory {}: {e}",
            dir.display()
        ))
    })
}

/// Reject blank required text before it reaches the store.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), DatabaseError> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{field} must not be empty")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mill_core::clock::SystemClock;

    use super::*;

    #[tokio::test]
    async fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MillConfig::default();
        config.database.path = dir
            .path()
            .join("nested/state/mill.db")
            .to_string_lossy()
            .into_owned();

        let svc = MillService::open(&config, Arc::new(SystemClock)).await.unwrap();
        assert!(dir.path().join("nested/state/mill.db").exists());
        svc.audit().shutdown().await;
    }

    #[tokio::test]
    async fn query_spec_uses_configured_default_limit() {
        let db = MillDb::open_local(":memory:").await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit = AuditRecorder::spawn(db.clone(), Arc::clone(&clock), 4);
        let svc = MillService::with_query_config(
            db,
            audit,
            clock,
            &QueryConfig {
                default_limit: 25,
                max_limit: 50,
            },
        );

        let spec = svc.query_spec(QueryParams::default()).unwrap();
        assert_eq!(spec.limit, 25);

        let explicit = svc
            .query_spec(QueryParams {
                limit: Some(5),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(explicit.limit, 5);

        assert!(svc.query_spec(QueryParams {
            page: Some(0),
            ..QueryParams::default()
        })
        .unwrap_err()
        .is_validation());
    }
}
