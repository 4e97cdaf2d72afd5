//! Link edges between content nodes.
//!
//! Edges are only ever stored in their direct direction. A reverse link type
//! (e.g. `children`) is answered by reading the direct edges (`parent`) that
//! point at a node, see [`crate::rules::LinkTypeRules`].

use serde::{Deserialize, Serialize};

use crate::id::{ContentId, LinkType, Locale};

/// Where a link was declared, which decides who can see it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkScope {
    /// Declared on the content id's link set: shared by every edition and
    /// locale, visible to both the live and the draft view.
    LinkSet,
    /// Owned by a single edition. Visible only for that edition's locale, and
    /// for `draft: true` only in the draft view.
    Edition { locale: Locale, draft: bool },
}

impl LinkScope {
    pub fn is_link_set(&self) -> bool {
        matches!(self, LinkScope::LinkSet)
    }

    /// The locale an edition link is bound to, if any.
    pub fn locale(&self) -> Option<&Locale> {
        match self {
            LinkScope::LinkSet => None,
            LinkScope::Edition { locale, .. } => Some(locale),
        }
    }
}

/// A directed, typed link `source --link_type--> target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEdge {
    pub source: ContentId,
    pub link_type: LinkType,
    pub target: ContentId,
    /// Ordering of targets within one `(source, link_type)` group.
    #[serde(default)]
    pub position: i32,
    pub scope: LinkScope,
}

impl LinkEdge {
    /// A link-set edge at position 0.
    pub fn new(source: ContentId, link_type: impl Into<LinkType>, target: ContentId) -> Self {
        LinkEdge {
            source,
            link_type: link_type.into(),
            target,
            position: 0,
            scope: LinkScope::LinkSet,
        }
    }

    pub fn at_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn scoped(mut self, scope: LinkScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Which link types a query may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTypeFilter {
    /// Every link type.
    Any,
    /// Only the listed types. An empty list matches nothing.
    Only(Vec<LinkType>),
}

impl LinkTypeFilter {
    pub fn allows(&self, link_type: &LinkType) -> bool {
        match self {
            LinkTypeFilter::Any => true,
            LinkTypeFilter::Only(types) => types.contains(link_type),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LinkTypeFilter::Only(types) if types.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_set_scope_has_no_locale() {
        assert_eq!(LinkScope::LinkSet.locale(), None);
        let scope = LinkScope::Edition {
            locale: Locale::from("cy"),
            draft: true,
        };
        assert_eq!(scope.locale().map(|l| l.as_str()), Some("cy"));
        assert!(!scope.is_link_set());
    }

    #[test]
    fn filter_any_allows_everything() {
        assert!(LinkTypeFilter::Any.allows(&LinkType::from("parent")));
        assert!(!LinkTypeFilter::Any.is_empty());
    }

    #[test]
    fn filter_only_is_exact() {
        let filter = LinkTypeFilter::Only(vec![LinkType::from("taxons")]);
        assert!(filter.allows(&LinkType::from("taxons")));
        assert!(!filter.allows(&LinkType::from("parent")));
        assert!(LinkTypeFilter::Only(vec![]).is_empty());
    }

    #[test]
    fn scope_serializes_tagged() {
        let json = serde_json::to_value(LinkScope::Edition {
            locale: Locale::from("fr"),
            draft: false,
        })
        .unwrap();
        assert_eq!(json["kind"], "edition");
        assert_eq!(json["locale"], "fr");
    }
}
