//! Database error types for mill-db.

use mill_core::errors::CoreError;
use thiserror::Error;

/// Errors from database operations.
///
/// `Validation` carries a request that was rejected before any SQL ran.
/// Every other variant is a storage failure.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or returned unreadable data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., the audit writer is gone).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The request was rejected before reaching the store.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True for failures a caller may retry.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        !self.is_validation() && !matches!(self, Self::NoResult)
    }
}
