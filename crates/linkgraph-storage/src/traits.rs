//! The storage contracts for the link graph and the expanded-links cache.
//!
//! Three traits, one per concern:
//! - [`LinkGraphReader`]: the read side the expansion and dependency walks
//!   use (edges in both directions, visible editions).
//! - [`ContentRepository`]: the write side, used by whoever applies content
//!   changes (and by fixtures and the CLI).
//! - [`ExpandedLinksStore`]: the versioned materialized cache with its
//!   per-key locked update.
//!
//! All backends ([`crate::InMemoryStore`], [`crate::SqliteStore`]) implement
//! all three, so they are swappable without touching the walks. The traits
//! are synchronous; async callers run them on the blocking pool.

use linkgraph_core::{
    ContentId, Edition, ExpandedLinks, ExpandedLinksKey, ExpandedLinksRecord, LinkEdge, LinkScope,
    LinkType, LinkTypeFilter, Locale,
};

use crate::error::StorageError;
use crate::types::UpdateOutcome;

/// Read access to link edges and editions.
pub trait LinkGraphReader: Send + Sync {
    /// Link-set edges declared on `source`, restricted to `filter`.
    fn links_from(
        &self,
        source: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError>;

    /// Link-set edges pointing at `target`, restricted to `filter`.
    fn links_to(
        &self,
        target: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError>;

    /// Edition links owned by the edition of `source` that is visible in the
    /// given locale and view.
    fn edition_links_from(
        &self,
        source: ContentId,
        locale: &Locale,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError>;

    /// Edition links pointing at `target` whose owning edition is the one
    /// visible in the given view.
    fn edition_links_to(
        &self,
        target: ContentId,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError>;

    /// The edition of `(content_id, locale)` visible in the given view: the
    /// draft where one exists and drafts are allowed, else the live edition.
    fn visible_edition(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
    ) -> Result<Option<Edition>, StorageError>;

    /// Locales in which `content_id` has a visible edition, sorted.
    fn visible_locales(
        &self,
        content_id: ContentId,
        with_drafts: bool,
    ) -> Result<Vec<Locale>, StorageError>;

    /// [`Self::visible_edition`] with fallback to the default locale.
    fn resolve_edition(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
    ) -> Result<Option<Edition>, StorageError> {
        if let Some(edition) = self.visible_edition(content_id, locale, with_drafts)? {
            return Ok(Some(edition));
        }
        if locale.is_default() {
            return Ok(None);
        }
        self.visible_edition(content_id, &Locale::default_locale(), with_drafts)
    }
}

/// Write access to editions and links.
pub trait ContentRepository: LinkGraphReader {
    /// Stores an edition as the current draft or live edition of its
    /// `(content_id, locale)`. Publishing a live edition retires a draft with
    /// the same or an older user-facing version. Superseded editions are not
    /// current and are ignored.
    fn put_edition(&self, edition: Edition) -> Result<(), StorageError>;

    /// Removes every edition of `content_id` and the links it declares.
    fn remove_content(&self, content_id: ContentId) -> Result<(), StorageError>;

    /// Adds a single link edge.
    fn add_link(&self, edge: LinkEdge) -> Result<(), StorageError>;

    /// Replaces the `link_type` targets of `source` in `scope`, preserving the
    /// given order as positions. Returns the previous targets that are no
    /// longer linked (the orphans).
    fn replace_links(
        &self,
        source: ContentId,
        link_type: &LinkType,
        scope: &LinkScope,
        targets: &[ContentId],
    ) -> Result<Vec<ContentId>, StorageError>;
}

/// The versioned expanded-links cache.
pub trait ExpandedLinksStore: Send + Sync {
    /// Applies `expanded_links` at `payload_version` under an exclusive lock
    /// on `key`.
    ///
    /// Creates the record if absent. Otherwise writes only when the stored
    /// version is `<= payload_version`; a newer stored version turns the call
    /// into a no-op reported as [`UpdateOutcome::Skipped`]. The lock covers
    /// the whole read-compare-write.
    fn locked_update(
        &self,
        key: &ExpandedLinksKey,
        payload_version: u64,
        expanded_links: &ExpandedLinks,
    ) -> Result<UpdateOutcome, StorageError>;

    /// Reads the current record for `key`.
    fn find_expanded_links(
        &self,
        key: &ExpandedLinksKey,
    ) -> Result<Option<ExpandedLinksRecord>, StorageError>;
}

/// A backend providing every storage concern.
pub trait Backend: ContentRepository + ExpandedLinksStore {}

impl<T: ContentRepository + ExpandedLinksStore> Backend for T {}

/// Sorts edges into the canonical order: link type, position, target.
pub(crate) fn sort_edges(edges: &mut [LinkEdge]) {
    edges.sort_by(|a, b| {
        (&a.link_type, a.position, a.target, a.source).cmp(&(&b.link_type, b.position, b.target, b.source))
    });
}
