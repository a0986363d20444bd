//! Cross-cutting error types for taskmill.
//!
//! Errors raised before any storage call live here. Storage errors are
//! defined in `mill-db` (`DatabaseError`), which wraps `CoreError` so callers
//! can still tell a rejected query apart from a failed one.

use thiserror::Error;

/// Errors that can be raised by any taskmill crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// Data failed validation (query spec, date strings, allow-lists).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Shorthand for building a `Validation` error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
