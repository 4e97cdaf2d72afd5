//! Field projections: which of a node's fields get embedded when it appears
//! as a link target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::LinkType;

/// A dotted path into an edition's field map, e.g. `details.logo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(SmallVec<[String; 2]>);

impl FieldPath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Reads the value at this path. Missing segments read as `Null`.
    pub fn dig<'a>(&self, source: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = source.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes `value` at this path, creating intermediate objects.
    pub fn dig_set(&self, target: &mut Map<String, Value>, value: Value) {
        let Some((last, parents)) = self.0.split_last() else {
            return;
        };
        let mut current = target;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.clone(), value);
    }

    /// Removes the value at this path, if present.
    pub fn remove_from(&self, target: &mut Map<String, Value>) -> Option<Value> {
        let (last, parents) = self.0.split_last()?;
        let mut current = target;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(last)
    }
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: SmallVec<[String; 2]> = s.split('.').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(CoreError::InvalidRules {
                reason: format!("invalid field path '{}'", s),
            });
        }
        Ok(FieldPath(segments))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A custom projection for a document type, optionally narrowed to a link
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub document_type: String,
    #[serde(default)]
    pub link_type: Option<LinkType>,
    pub fields: Vec<FieldPath>,
}

/// Builds the projected map for `fields` out of `source`.
pub fn project(source: &Map<String, Value>, fields: &[FieldPath]) -> Map<String, Value> {
    let mut projected = Map::new();
    for field in fields {
        let value = field.dig(source).cloned().unwrap_or(Value::Null);
        field.dig_set(&mut projected, value);
    }
    projected
}

/// Parses a static list of dotted field names.
pub(crate) fn field_list(names: &[&str]) -> Vec<FieldPath> {
    names
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> Map<String, Value> {
        json!({
            "title": "HMRC",
            "details": { "logo": { "crest": "hmrc" }, "brand": "hm-revenue-customs" },
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn projects_nested_fields() {
        let fields = field_list(&["title", "details.logo"]);
        let projected = project(&source(), &fields);
        assert_eq!(
            Value::Object(projected),
            json!({ "title": "HMRC", "details": { "logo": { "crest": "hmrc" } } })
        );
    }

    #[test]
    fn missing_fields_project_as_null() {
        let fields = field_list(&["description", "details.default_news_image"]);
        let projected = project(&source(), &fields);
        assert_eq!(
            Value::Object(projected),
            json!({ "description": null, "details": { "default_news_image": null } })
        );
    }

    #[test]
    fn removes_nested_fields_and_ignores_missing_ones() {
        let mut map = source();
        let logo: FieldPath = "details.logo".parse().unwrap();
        assert_eq!(logo.remove_from(&mut map), Some(json!({ "crest": "hmrc" })));
        assert_eq!(logo.remove_from(&mut map), None);

        let missing: FieldPath = "title.nested".parse().unwrap();
        assert_eq!(missing.remove_from(&mut map), None);
        assert_eq!(
            Value::Object(map),
            json!({ "title": "HMRC", "details": { "brand": "hm-revenue-customs" } })
        );
    }

    #[test]
    fn rejects_empty_segments() {
        assert!("details..logo".parse::<FieldPath>().is_err());
        assert!("".parse::<FieldPath>().is_err());
    }

    #[test]
    fn serializes_as_dotted_string() {
        let path: FieldPath = "details.step_by_step_nav.steps".parse().unwrap();
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            json!("details.step_by_step_nav.steps")
        );
    }
}
