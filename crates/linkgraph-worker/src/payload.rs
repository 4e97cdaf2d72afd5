//! The document pushed to a downstream content store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use linkgraph_core::{Edition, ExpandedLinks, LinkTypeRules, TargetStore};

/// A node's own fields plus its expanded links, stamped with the version
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamPayload {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub expanded_links: ExpandedLinks,
    pub payload_version: u64,
}

impl DownstreamPayload {
    /// Builds the payload for `target`. Draft-only fields never reach the
    /// live store.
    pub fn build(
        edition: &Edition,
        rules: &LinkTypeRules,
        target: TargetStore,
        expanded_links: ExpandedLinks,
        payload_version: u64,
    ) -> Self {
        let mut fields = edition.field_map();
        if !target.with_drafts() {
            for field in rules.draft_only_fields() {
                field.remove_from(&mut fields);
            }
        }
        DownstreamPayload {
            fields,
            expanded_links,
            payload_version,
        }
    }

    pub fn base_path(&self) -> Option<&str> {
        self.fields.get("base_path").and_then(Value::as_str)
    }
}
