//! Worker error types and the retry policy attached to them.
//!
//! [`WorkerError`] separates failures a retry can fix (downstream delivery,
//! storage I/O) from failures it cannot (the target is gone, the data breaks
//! an invariant). The pool consults [`WorkerError::is_retryable`] to decide
//! whether a job goes back on the queue.

use linkgraph_core::{ContentId, CoreError, Locale};
use linkgraph_expansion::ExpansionError;
use linkgraph_storage::StorageError;

/// Errors produced while dispatching or performing downstream jobs.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The content node no longer exists in the requested locale.
    #[error("content {content_id} ({locale}) not found")]
    MissingTarget { content_id: ContentId, locale: Locale },

    /// The node's data breaks an invariant required to build its payload.
    #[error("invariant violated for {content_id}: {reason}")]
    InvariantViolation { content_id: ContentId, reason: String },

    /// The downstream content store could not be reached or failed.
    #[error("downstream delivery failed: {reason}")]
    TransientDelivery { reason: String },

    /// The downstream content store refused the payload.
    #[error("downstream store rejected the payload ({status}): {reason}")]
    DeliveryRejected { status: u16, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    /// Rule tables could not be loaded.
    #[error(transparent)]
    Rules(#[from] CoreError),

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// A message could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl WorkerError {
    /// Whether running the same job again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::TransientDelivery { .. } | WorkerError::Storage(_) => true,
            WorkerError::Expansion(ExpansionError::Storage(_)) => true,
            WorkerError::Io(_) => true,
            WorkerError::MissingTarget { .. }
            | WorkerError::InvariantViolation { .. }
            | WorkerError::DeliveryRejected { .. }
            | WorkerError::Expansion(_)
            | WorkerError::Rules(_)
            | WorkerError::Config { .. }
            | WorkerError::Malformed(_)
            | WorkerError::TaskJoin(_) => false,
        }
    }

    /// Short machine-readable name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::MissingTarget { .. } => "missing_target",
            WorkerError::InvariantViolation { .. } => "invariant_violation",
            WorkerError::TransientDelivery { .. } => "transient_delivery",
            WorkerError::DeliveryRejected { .. } => "delivery_rejected",
            WorkerError::Storage(_) => "storage",
            WorkerError::Expansion(_) => "expansion",
            WorkerError::Rules(_) => "rules",
            WorkerError::Config { .. } => "config",
            WorkerError::Malformed(_) => "malformed",
            WorkerError::Io(_) => "io",
            WorkerError::TaskJoin(_) => "task_join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_delivery_and_storage_failures_are_retried() {
        let id = ContentId::new_v4();
        assert!(WorkerError::TransientDelivery {
            reason: "503".into()
        }
        .is_retryable());
        assert!(WorkerError::Storage(StorageError::Migration("locked".into())).is_retryable());
        assert!(
            WorkerError::Expansion(ExpansionError::Storage(StorageError::Migration(
                "locked".into()
            )))
            .is_retryable()
        );

        assert!(!WorkerError::MissingTarget {
            content_id: id,
            locale: Locale::from("en"),
        }
        .is_retryable());
        assert!(!WorkerError::InvariantViolation {
            content_id: id,
            reason: "no base path".into(),
        }
        .is_retryable());
        assert!(!WorkerError::DeliveryRejected {
            status: 422,
            reason: "unknown schema".into(),
        }
        .is_retryable());
        assert!(!WorkerError::Expansion(ExpansionError::Invariant {
            content_id: id,
            reason: "unknown alias".into(),
        })
        .is_retryable());
    }
}
