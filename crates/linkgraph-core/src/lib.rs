//! Data model and rule tables for link expansion and dependency resolution.
//!
//! - [`id`]: content ids, locales, link type names
//! - [`edition`]: editions and their lifecycle states, target stores
//! - [`edge`]: link edges and their visibility scopes
//! - [`expanded`]: the expanded-links document and its materialized record
//! - [`rules`]: reverse aliases, the expansion path catalog, field projections

pub mod edge;
pub mod edition;
pub mod error;
pub mod expanded;
pub mod id;
pub mod rules;

// Re-export commonly used types
pub use edge::{LinkEdge, LinkScope, LinkTypeFilter};
pub use edition::{Edition, EditionState, TargetStore};
pub use error::CoreError;
pub use expanded::{ExpandedLinks, ExpandedLinksKey, ExpandedLinksRecord, ExpandedNode};
pub use id::{ContentId, LinkType, Locale, DEFAULT_LOCALE};
pub use rules::{ExpansionPath, FieldPath, LinkTypeRules, PathStep};
