//! Storage error types for linkgraph-storage.
//!
//! [`StorageError`] covers the failure modes of the storage layer:
//! serialization, SQLite and migration failures, poisoned locks, and
//! integrity violations in stored rows.

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite backend reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding shared state was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A stored row could not be interpreted.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },
}

impl StorageError {
    pub(crate) fn poisoned(what: &str) -> Self {
        StorageError::LockPoisoned(what.to_string())
    }
}
