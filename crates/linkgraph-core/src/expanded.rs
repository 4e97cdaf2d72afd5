//! The expanded-links document and the materialized record that caches it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::edition::TargetStore;
use crate::id::{ContentId, LinkType, Locale};

/// A node's expanded links: link type -> ordered linked nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedLinks(IndexMap<LinkType, Vec<ExpandedNode>>);

impl ExpandedLinks {
    pub fn new() -> Self {
        ExpandedLinks(IndexMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, link_type: &str) -> Option<&[ExpandedNode]> {
        self.0.get(link_type).map(Vec::as_slice)
    }

    /// Sets the nodes for a link type. An empty list removes the entry, so a
    /// link type only appears when it has at least one node.
    pub fn insert(&mut self, link_type: LinkType, nodes: Vec<ExpandedNode>) {
        if nodes.is_empty() {
            self.0.shift_remove(&link_type);
        } else {
            self.0.insert(link_type, nodes);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkType, &Vec<ExpandedNode>)> {
        self.0.iter()
    }

    pub fn link_types(&self) -> impl Iterator<Item = &LinkType> {
        self.0.keys()
    }

    /// Content ids of every embedded node, depth-first.
    pub fn content_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for nodes in self.0.values() {
            for node in nodes {
                if let Some(Value::String(id)) = node.fields.get("content_id") {
                    ids.push(id.clone());
                }
                ids.extend(node.links.content_ids());
            }
        }
        ids
    }
}

/// One linked node: its projected fields plus its own expanded links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedNode {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub links: ExpandedLinks,
}

impl ExpandedNode {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Identity of a materialized expanded-links record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpandedLinksKey {
    pub content_id: ContentId,
    pub locale: Locale,
    pub with_drafts: bool,
}

impl ExpandedLinksKey {
    pub fn new(content_id: ContentId, locale: Locale, target: TargetStore) -> Self {
        ExpandedLinksKey {
            content_id,
            locale,
            with_drafts: target.with_drafts(),
        }
    }
}

/// The cached expansion for one key. `payload_version` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedLinksRecord {
    pub key: ExpandedLinksKey,
    pub payload_version: u64,
    pub expanded_links: ExpandedLinks,
}
