//! Storage for the link graph and the expanded-links cache.
//!
//! Provides the storage contracts ([`LinkGraphReader`], [`ContentRepository`],
//! [`ExpandedLinksStore`]) plus [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: UpdateOutcome, the result of a versioned write
//! - [`traits`]: the storage contracts
//! - [`locks`]: per-key exclusive locks
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod locks;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use locks::KeyLocks;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Backend, ContentRepository, ExpandedLinksStore, LinkGraphReader};
pub use types::UpdateOutcome;
