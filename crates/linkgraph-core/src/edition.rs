//! Editions: versioned instances of a content item in a lifecycle state.
//!
//! A content node `(content_id, locale)` has at most one current draft and
//! one current live edition. Superseded editions are history and never take
//! part in expansion. Redirect and gone editions are live but resolve to an
//! empty link set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::id::{ContentId, Locale};

/// Lifecycle state of an edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionState {
    Draft,
    Published,
    Superseded,
    Withdrawn,
    Redirect,
    Gone,
}

impl EditionState {
    pub fn is_draft(&self) -> bool {
        matches!(self, EditionState::Draft)
    }

    /// Redirect and gone editions contribute no links and are never embedded.
    pub fn resolves_empty(&self) -> bool {
        matches!(self, EditionState::Redirect | EditionState::Gone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditionState::Draft => "draft",
            EditionState::Published => "published",
            EditionState::Superseded => "superseded",
            EditionState::Withdrawn => "withdrawn",
            EditionState::Redirect => "redirect",
            EditionState::Gone => "gone",
        }
    }
}

/// Which downstream content store a change targets.
///
/// The draft store sees draft editions where they exist (falling back to live
/// ones); the live store sees live editions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStore {
    Live,
    Draft,
}

impl TargetStore {
    pub fn with_drafts(&self) -> bool {
        matches!(self, TargetStore::Draft)
    }

    pub fn from_with_drafts(with_drafts: bool) -> Self {
        if with_drafts {
            TargetStore::Draft
        } else {
            TargetStore::Live
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStore::Live => "live",
            TargetStore::Draft => "draft",
        }
    }
}

/// A single edition of a content node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    pub content_id: ContentId,
    pub locale: Locale,
    pub state: EditionState,
    pub document_type: String,
    pub schema_name: String,
    pub title: String,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub analytics_identifier: Option<String>,
    /// ISO 8601 timestamp, kept as text.
    #[serde(default)]
    pub public_updated_at: Option<String>,
    #[serde(default)]
    pub auth_bypass_ids: Vec<Uuid>,
    pub user_facing_version: u64,
}

impl Edition {
    /// Creates an edition with empty optional fields. Mostly used by fixtures
    /// and the CLI; real editions come from storage.
    pub fn new(
        content_id: ContentId,
        locale: Locale,
        state: EditionState,
        document_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let document_type = document_type.into();
        Edition {
            content_id,
            locale,
            state,
            schema_name: document_type.clone(),
            document_type,
            title: title.into(),
            base_path: None,
            description: None,
            details: Value::Object(Map::new()),
            phase: None,
            analytics_identifier: None,
            public_updated_at: None,
            auth_bypass_ids: Vec::new(),
            user_facing_version: 1,
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// The content API path derived from the base path.
    pub fn api_path(&self) -> Option<String> {
        self.base_path
            .as_ref()
            .map(|path| format!("/api/content{}", path))
    }

    /// Flattens the edition into the field map that projections read from.
    ///
    /// Keys are the field names used in projection rules; nested fields
    /// (e.g. `details.logo`) are reached by digging into `details`.
    pub fn field_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "analytics_identifier".into(),
            opt_string(&self.analytics_identifier),
        );
        map.insert("api_path".into(), opt_string(&self.api_path()));
        map.insert("base_path".into(), opt_string(&self.base_path));
        map.insert(
            "content_id".into(),
            Value::String(self.content_id.to_string()),
        );
        map.insert(
            "document_type".into(),
            Value::String(self.document_type.clone()),
        );
        map.insert("locale".into(), Value::String(self.locale.to_string()));
        map.insert(
            "public_updated_at".into(),
            opt_string(&self.public_updated_at),
        );
        map.insert("schema_name".into(), Value::String(self.schema_name.clone()));
        map.insert("title".into(), Value::String(self.title.clone()));
        map.insert(
            "withdrawn".into(),
            Value::Bool(self.state == EditionState::Withdrawn),
        );
        map.insert("description".into(), opt_string(&self.description));
        map.insert("details".into(), self.details.clone());
        map.insert("phase".into(), opt_string(&self.phase));
        map.insert("state".into(), Value::String(self.state.as_str().into()));
        map.insert(
            "auth_bypass_ids".into(),
            Value::Array(
                self.auth_bypass_ids
                    .iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect(),
            ),
        );
        map
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}
