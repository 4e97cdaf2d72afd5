//! Static link-type rule tables.
//!
//! [`LinkTypeRules`] answers three questions for the expansion and dependency
//! walks:
//! - which direct link type a reverse alias stands for (and vice versa),
//! - which link type may be taken next after a traversed sequence, bounded by
//!   the declared [`ExpansionPath`] catalog,
//! - which fields of a node are embedded when it appears as a link target.
//!
//! The tables are built once (the standard catalog or a JSON override) and
//! shared read-only, typically behind an `Arc`.

pub mod fields;
pub mod paths;
mod standard;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::edge::LinkTypeFilter;
use crate::edition::Edition;
use crate::error::CoreError;
use crate::id::LinkType;

pub use fields::{project, FieldPath, FieldRule};
pub use paths::{ExpansionPath, PathStep};

/// The process-wide rule tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTypeRules {
    /// Direct link type -> reverse alias.
    pub(crate) reverse_links: IndexMap<LinkType, LinkType>,
    /// Declared multi-hop expansion paths.
    pub(crate) paths: Vec<ExpansionPath>,
    /// Reverse types fetched at the root of an expansion. `None` means every
    /// registered reverse alias.
    #[serde(default)]
    pub(crate) root_reverse_links: Option<Vec<LinkType>>,
    pub(crate) default_fields: Vec<FieldPath>,
    #[serde(default)]
    pub(crate) draft_only_fields: Vec<FieldPath>,
    #[serde(default)]
    pub(crate) field_rules: Vec<FieldRule>,
}

impl LinkTypeRules {
    /// The built-in production catalog.
    pub fn standard() -> Self {
        standard::standard_rules()
    }

    /// Loads rule tables from JSON and validates them.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let rules: LinkTypeRules = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Checks that no name is registered both as a direct type and as a
    /// reverse alias, and that configured root reverse types exist.
    pub fn validate(&self) -> Result<(), CoreError> {
        for reverse in self.reverse_links.values() {
            if self.reverse_links.contains_key(reverse) {
                return Err(CoreError::InvalidRules {
                    reason: format!("'{}' is both a direct type and a reverse alias", reverse),
                });
            }
        }
        if let Some(root) = &self.root_reverse_links {
            if let Some(unknown) = root.iter().find(|lt| !self.is_reverse(lt)) {
                return Err(CoreError::InvalidRules {
                    reason: format!("root reverse link '{}' is not a reverse alias", unknown),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reverse aliases
    // -----------------------------------------------------------------------

    /// The reverse alias registered for a direct link type.
    pub fn reverse_of(&self, link_type: &LinkType) -> Option<&LinkType> {
        self.reverse_links.get(link_type)
    }

    /// Every direct type whose reverse alias is `reverse`. Several direct
    /// types may share one alias (`person` and `role` both reverse to
    /// `role_appointments`).
    pub fn direct_types_for(&self, reverse: &LinkType) -> Vec<LinkType> {
        self.reverse_links
            .iter()
            .filter(|(_, alias)| *alias == reverse)
            .map(|(direct, _)| direct.clone())
            .collect()
    }

    pub fn is_reverse(&self, link_type: &LinkType) -> bool {
        self.reverse_links.values().any(|alias| alias == link_type)
    }

    /// All registered reverse aliases, de-duplicated, in table order.
    pub fn reverse_link_types(&self) -> Vec<LinkType> {
        let mut seen = Vec::new();
        for alias in self.reverse_links.values() {
            if !seen.contains(alias) {
                seen.push(alias.clone());
            }
        }
        seen
    }

    /// Reverse types fetched at the root of an expansion.
    pub fn root_reverse_links(&self) -> Vec<LinkType> {
        match &self.root_reverse_links {
            Some(types) => types.clone(),
            None => self.reverse_link_types(),
        }
    }

    /// Maps reverse aliases to the direct types stored in the edge table.
    pub fn un_reverse(&self, reverse_types: &[LinkType]) -> Vec<LinkType> {
        let mut direct = Vec::new();
        for reverse in reverse_types {
            for link_type in self.direct_types_for(reverse) {
                if !direct.contains(&link_type) {
                    direct.push(link_type);
                }
            }
        }
        direct
    }

    /// Splits link types into `(reverse, direct)`.
    pub fn partition_reverse(&self, link_types: Vec<LinkType>) -> (Vec<LinkType>, Vec<LinkType>) {
        link_types
            .into_iter()
            .partition(|link_type| self.is_reverse(link_type))
    }

    // -----------------------------------------------------------------------
    // Path catalog
    // -----------------------------------------------------------------------

    pub fn paths(&self) -> &[ExpansionPath] {
        &self.paths
    }

    /// Link types that may be taken after `path_so_far`.
    ///
    /// The root (empty path) is unrestricted. Deeper paths must be a prefix of
    /// a declared path; the result is empty when the walk has to stop.
    pub fn allowed_next_steps(&self, path_so_far: &[LinkType]) -> LinkTypeFilter {
        if path_so_far.is_empty() {
            return LinkTypeFilter::Any;
        }
        let next: BTreeSet<LinkType> = self
            .paths
            .iter()
            .flat_map(|path| path.next_steps(path_so_far))
            .collect();
        LinkTypeFilter::Only(next.into_iter().collect())
    }

    /// Root-adjacent paths are always valid; deeper ones must match a
    /// declared path exactly.
    pub fn is_valid_path(&self, path: &[LinkType]) -> bool {
        path.len() == 1 || self.matches_declared_path(path)
    }

    pub fn matches_declared_path(&self, path: &[LinkType]) -> bool {
        self.paths.iter().any(|p| p.matches_exactly(path))
    }

    /// Returns `true` when `path` can be walked from some root: length 0 or
    /// 1, or a prefix of a declared path.
    pub fn is_walkable(&self, path: &[LinkType]) -> bool {
        path.len() <= 1 || self.paths.iter().any(|p| p.matches_prefix(path))
    }

    /// Link types that may be followed backwards from a node that sits at the
    /// end of `expansion_path` (given root-first).
    ///
    /// Stepping back along `t` means some root reaches the changed node
    /// through a walk ending in `[t] ++ expansion_path`. Every walk longer
    /// than one hop follows a declared path from its start, so that sequence
    /// has to match a contiguous run of steps in one of them.
    pub fn dependency_next_steps(&self, expansion_path: &[LinkType]) -> LinkTypeFilter {
        if expansion_path.is_empty() {
            return LinkTypeFilter::Any;
        }
        let mut candidate = Vec::with_capacity(expansion_path.len() + 1);
        let next: BTreeSet<LinkType> = self
            .catalog_link_types()
            .into_iter()
            .filter(|link_type| {
                candidate.clear();
                candidate.push(link_type.clone());
                candidate.extend_from_slice(expansion_path);
                self.paths.iter().any(|p| p.matches_window(&candidate))
            })
            .collect();
        LinkTypeFilter::Only(next.into_iter().collect())
    }

    /// Where `expansion_path` can sit in each declared path, in catalog
    /// order. Two expansion paths with equal positions get the same
    /// [`Self::dependency_next_steps`], and so do their extensions by the same
    /// link type.
    pub fn window_positions(&self, expansion_path: &[LinkType]) -> Vec<BTreeSet<usize>> {
        self.paths
            .iter()
            .map(|p| p.window_starts(expansion_path))
            .collect()
    }

    /// Every link type named by the path catalog.
    pub fn catalog_link_types(&self) -> BTreeSet<LinkType> {
        self.paths
            .iter()
            .flat_map(|p| p.steps().iter().map(|s| s.link_type.clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Field projection
    // -----------------------------------------------------------------------

    /// Fields embedded for a node of `document_type`.
    ///
    /// With a link type, the most specific rule wins: document type + link
    /// type, then document type alone, then the default set. Without one, all
    /// rules for the document type are combined (plus the defaults if none of
    /// them is link-type agnostic). Draft-only fields are dropped unless
    /// `draft_allowed`.
    pub fn projection_fields(
        &self,
        document_type: &str,
        link_type: Option<&LinkType>,
        draft_allowed: bool,
    ) -> Vec<FieldPath> {
        let fields = match link_type {
            Some(link_type) => self.fields_for_linked_document_type(document_type, link_type),
            None => self.fields_for_document_type(document_type),
        };
        if draft_allowed {
            fields
        } else {
            fields
                .into_iter()
                .filter(|field| !self.draft_only_fields.contains(field))
                .collect()
        }
    }

    fn fields_for_linked_document_type(
        &self,
        document_type: &str,
        link_type: &LinkType,
    ) -> Vec<FieldPath> {
        let exact = self.field_rules.iter().find(|rule| {
            rule.document_type == document_type && rule.link_type.as_ref() == Some(link_type)
        });
        if let Some(rule) = exact {
            return rule.fields.clone();
        }
        let by_document_type = self
            .field_rules
            .iter()
            .find(|rule| rule.document_type == document_type && rule.link_type.is_none());
        match by_document_type {
            Some(rule) => rule.fields.clone(),
            None => self.default_fields.clone(),
        }
    }

    fn fields_for_document_type(&self, document_type: &str) -> Vec<FieldPath> {
        let matching: Vec<&FieldRule> = self
            .field_rules
            .iter()
            .filter(|rule| rule.document_type == document_type)
            .collect();
        if matching.is_empty() {
            return self.default_fields.clone();
        }

        let mut collated: Vec<FieldPath> = Vec::new();
        let mut push = |field: &FieldPath| {
            if !collated.contains(field) {
                collated.push(field.clone());
            }
        };
        for rule in &matching {
            rule.fields.iter().for_each(&mut push);
        }
        if !matching.iter().any(|rule| rule.link_type.is_none()) {
            self.default_fields.iter().for_each(&mut push);
        }
        collated
    }

    /// Fields only ever sent to the draft content store.
    pub fn draft_only_fields(&self) -> &[FieldPath] {
        &self.draft_only_fields
    }

    /// Projects an edition for embedding under `link_type`.
    pub fn project(
        &self,
        edition: &Edition,
        link_type: Option<&LinkType>,
        draft_allowed: bool,
    ) -> Map<String, Value> {
        let fields = self.projection_fields(&edition.document_type, link_type, draft_allowed);
        project(&edition.field_map(), &fields)
    }
}

impl Default for LinkTypeRules {
    fn default() -> Self {
        Self::standard()
    }
}
