//! Errors raised while walking the link graph.

use thiserror::Error;

use linkgraph_core::ContentId;
use linkgraph_storage::StorageError;

#[derive(Debug, Error)]
pub enum ExpansionError {
    /// Reading edges or editions failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A walk reached a state the rule tables should have ruled out.
    #[error("invariant violated at {content_id}: {reason}")]
    Invariant { content_id: ContentId, reason: String },
}
