//! Link-graph walks: forward expansion and backward dependency resolution.
//!
//! - [`reference`]: per-step edge fetching with reverse-alias handling
//! - [`expander`]: [`LinkExpander`], the recursive expanded-links builder
//! - [`resolver`]: [`DependencyResolver`], the backward dependee walk
//!
//! Both walks share the rule tables and are bounded by the same path
//! catalog. They read through [`linkgraph_storage::LinkGraphReader`] and
//! never write.

pub mod error;
pub mod expander;
pub mod reference;
pub mod resolver;

pub use error::ExpansionError;
pub use expander::LinkExpander;
pub use reference::{LinkReference, LinksByType};
pub use resolver::{Dependee, DependencyResolver};
