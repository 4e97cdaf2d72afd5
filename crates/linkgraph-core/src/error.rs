//! Core error types for linkgraph-core.
//!
//! Uses `thiserror` for structured, matchable variants covering the failure
//! modes of the data model and rule tables.

use thiserror::Error;

use crate::id::{ContentId, Locale};

/// Core errors produced by the linkgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Rule tables failed validation.
    #[error("invalid rules: {reason}")]
    InvalidRules { reason: String },

    /// Rule tables or a document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An edition violates a required invariant.
    #[error("invalid edition {content_id} ({locale}): {reason}")]
    InvalidEdition {
        content_id: ContentId,
        locale: Locale,
        reason: String,
    },
}
