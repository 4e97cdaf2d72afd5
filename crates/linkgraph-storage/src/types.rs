//! Storage-layer result types.

use serde::{Deserialize, Serialize};

/// What a versioned write did.
///
/// A stale write is not an error: it is reported as [`UpdateOutcome::Skipped`]
/// and leaves the stored record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// No record existed; one was created at the intended version.
    Created,
    /// The stored version was not newer; the record now holds the new data.
    Applied { previous_version: u64 },
    /// The stored version is newer than the intended one; nothing changed.
    Skipped { stored_version: u64 },
}

impl UpdateOutcome {
    /// Returns `true` if the write changed stored state.
    pub fn was_written(&self) -> bool {
        !matches!(self, UpdateOutcome::Skipped { .. })
    }
}
