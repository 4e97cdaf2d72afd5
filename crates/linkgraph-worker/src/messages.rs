//! Messages exchanged with the queue: change notifications coming in, and
//! downstream jobs going out to workers.

use serde::{Deserialize, Serialize};

use linkgraph_core::{ContentId, Locale, TargetStore};

/// Where a change came from. Carried for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub changed_fields: Vec<String>,
}

/// A content node changed and everything embedding it has to be refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub content_id: ContentId,
    /// `None` when the change affects every locale of the node.
    #[serde(default)]
    pub locale: Option<Locale>,
    pub target_store: TargetStore,
    pub intended_version: u64,
    /// Nodes that stopped being linked by this change.
    #[serde(default)]
    pub orphaned_content_ids: Vec<ContentId>,
    #[serde(default)]
    pub source_metadata: SourceMetadata,
}

impl ChangeNotification {
    pub fn new(content_id: ContentId, target_store: TargetStore, intended_version: u64) -> Self {
        ChangeNotification {
            content_id,
            locale: None,
            target_store,
            intended_version,
            orphaned_content_ids: Vec::new(),
            source_metadata: SourceMetadata::default(),
        }
    }

    pub fn in_locale(mut self, locale: impl Into<Locale>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_orphans(mut self, orphans: Vec<ContentId>) -> Self {
        self.orphaned_content_ids = orphans;
        self
    }
}

/// Queue partition a job is placed on. High jobs are always taken first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Low,
}

/// Recompute and republish one node's expanded view in one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamJob {
    pub content_id: ContentId,
    pub locale: Locale,
    pub target_store: TargetStore,
    pub intended_version: u64,
    /// Re-resolve and fan out to this node's dependees once published.
    pub recheck_dependencies: bool,
    /// Orphans of the originating change, forwarded to the recheck.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphaned_content_ids: Vec<ContentId>,
    /// Number of earlier failed attempts.
    #[serde(default)]
    pub attempt: u32,
}

impl DownstreamJob {
    /// The job for a dependee of a change: low priority, no further fan-out.
    pub fn dependee(
        content_id: ContentId,
        locale: Locale,
        target_store: TargetStore,
        intended_version: u64,
    ) -> Self {
        DownstreamJob {
            content_id,
            locale,
            target_store,
            intended_version,
            recheck_dependencies: false,
            orphaned_content_ids: Vec::new(),
            attempt: 0,
        }
    }

    /// The same job, scheduled again after a failure.
    pub fn retried(&self) -> Self {
        DownstreamJob {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_optional_fields_default() {
        let id = ContentId::new_v4();
        let parsed: ChangeNotification = serde_json::from_value(json!({
            "content_id": id.to_string(),
            "target_store": "live",
            "intended_version": 7,
        }))
        .unwrap();

        assert_eq!(parsed, ChangeNotification::new(id, TargetStore::Live, 7));
    }

    #[test]
    fn notification_carries_source_metadata() {
        let id = ContentId::new_v4();
        let parsed: ChangeNotification = serde_json::from_value(json!({
            "content_id": id.to_string(),
            "locale": "fr",
            "target_store": "draft",
            "intended_version": 2,
            "source_metadata": {
                "command": "put_content",
                "document_type": "taxon",
                "changed_fields": ["title"],
            },
        }))
        .unwrap();

        assert_eq!(parsed.locale, Some(Locale::from("fr")));
        assert_eq!(parsed.source_metadata.command.as_deref(), Some("put_content"));
        assert_eq!(parsed.source_metadata.changed_fields, vec!["title".to_string()]);
    }

    #[test]
    fn retried_job_counts_attempts_and_keeps_version() {
        let job = DownstreamJob::dependee(ContentId::new_v4(), Locale::from("en"), TargetStore::Live, 4);
        let again = job.retried().retried();
        assert_eq!(again.attempt, 2);
        assert_eq!(again.intended_version, 4);
        assert!(!again.recheck_dependencies);
    }
}
