//! Identity newtypes for content nodes and link categories.
//!
//! All identifiers are distinct newtype wrappers so that a [`Locale`] cannot be
//! passed where a [`LinkType`] is expected, even though both are strings
//! underneath.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The locale used when a linked node has no edition in the requested locale.
pub const DEFAULT_LOCALE: &str = "en";

/// Stable content identifier shared by every edition and translation of a
/// content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub Uuid);

impl ContentId {
    /// Generates a fresh random content id.
    pub fn new_v4() -> Self {
        ContentId(Uuid::new_v4())
    }
}

impl FromStr for ContentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ContentId)
    }
}

impl From<Uuid> for ContentId {
    fn from(id: Uuid) -> Self {
        ContentId(id)
    }
}

/// A content locale such as `en` or `fr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(locale: impl Into<String>) -> Self {
        Locale(locale.into())
    }

    /// The fallback locale (`en`).
    pub fn default_locale() -> Self {
        Locale(DEFAULT_LOCALE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_LOCALE
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::default_locale()
    }
}

impl From<&str> for Locale {
    fn from(s: &str) -> Self {
        Locale(s.to_string())
    }
}

/// A named category of relationship between content nodes, e.g. `parent`
/// or `role_appointments`.
///
/// Whether a name is a direct type or a reverse alias is decided by the rule
/// tables, not by the name itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkType(String);

impl LinkType {
    pub fn new(name: impl Into<String>) -> Self {
        LinkType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LinkType {
    fn from(s: &str) -> Self {
        LinkType(s.to_string())
    }
}

impl Borrow<str> for LinkType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
