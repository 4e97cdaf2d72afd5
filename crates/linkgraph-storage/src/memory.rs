//! In-memory implementation of the storage traits.
//!
//! [`InMemoryStore`] keeps link edges in a petgraph `StableDiGraph`, so both
//! edge directions are answered from the graph's adjacency lists. Editions
//! live in a map of draft/live slots, and the expanded-links cache in a
//! `DashMap` guarded by per-key locks. Semantics match [`crate::SqliteStore`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use linkgraph_core::{
    ContentId, Edition, EditionState, ExpandedLinks, ExpandedLinksKey, ExpandedLinksRecord,
    LinkEdge, LinkScope, LinkType, LinkTypeFilter, Locale,
};

use crate::error::StorageError;
use crate::locks::KeyLocks;
use crate::traits::{sort_edges, ContentRepository, ExpandedLinksStore, LinkGraphReader};
use crate::types::UpdateOutcome;

/// Idle lock entries are pruned once the table grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// The current draft and live editions of one `(content_id, locale)`.
#[derive(Debug, Clone, Default)]
struct EditionSlots {
    draft: Option<Edition>,
    live: Option<Edition>,
}

impl EditionSlots {
    fn visible(&self, with_drafts: bool) -> Option<&Edition> {
        if with_drafts {
            self.draft.as_ref().or(self.live.as_ref())
        } else {
            self.live.as_ref()
        }
    }

    fn is_empty(&self) -> bool {
        self.draft.is_none() && self.live.is_none()
    }
}

/// Content ids as graph nodes, link edges as graph edges.
#[derive(Debug, Default)]
struct LinkIndex {
    graph: StableDiGraph<ContentId, LinkEdge>,
    nodes: HashMap<ContentId, NodeIndex>,
}

impl LinkIndex {
    fn ensure_node(&mut self, id: ContentId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id);
        self.nodes.insert(id, idx);
        idx
    }

    fn edges(&self, id: ContentId, direction: Direction) -> Vec<&LinkEdge> {
        match self.nodes.get(&id) {
            Some(&idx) => self
                .graph
                .edges_directed(idx, direction)
                .map(|edge| edge.weight())
                .collect(),
            None => Vec::new(),
        }
    }

    fn add(&mut self, edge: LinkEdge) {
        let from = self.ensure_node(edge.source);
        let to = self.ensure_node(edge.target);
        self.graph.add_edge(from, to, edge);
    }

    /// Removes outgoing edges of `source` matching `matches`, returning them.
    fn remove_outgoing(
        &mut self,
        source: ContentId,
        matches: impl Fn(&LinkEdge) -> bool,
    ) -> Vec<LinkEdge> {
        let Some(&idx) = self.nodes.get(&source) else {
            return Vec::new();
        };
        let ids: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| matches(edge.weight()))
            .map(|edge| edge.id())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.graph.remove_edge(id))
            .collect()
    }
}

/// In-memory storage backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    links: RwLock<LinkIndex>,
    editions: RwLock<HashMap<(ContentId, Locale), EditionSlots>>,
    expanded: DashMap<ExpandedLinksKey, ExpandedLinksRecord>,
    locks: KeyLocks<ExpandedLinksKey>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn links_read(&self) -> Result<RwLockReadGuard<'_, LinkIndex>, StorageError> {
        self.links.read().map_err(|_| StorageError::poisoned("links"))
    }

    fn links_write(&self) -> Result<RwLockWriteGuard<'_, LinkIndex>, StorageError> {
        self.links.write().map_err(|_| StorageError::poisoned("links"))
    }

    fn editions_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<(ContentId, Locale), EditionSlots>>, StorageError>
    {
        self.editions
            .read()
            .map_err(|_| StorageError::poisoned("editions"))
    }

    fn editions_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<(ContentId, Locale), EditionSlots>>, StorageError>
    {
        self.editions
            .write()
            .map_err(|_| StorageError::poisoned("editions"))
    }

    /// Whether the edition owning `scope` on `source` is the visible one.
    fn edition_scope_visible(
        editions: &HashMap<(ContentId, Locale), EditionSlots>,
        source: ContentId,
        scope: &LinkScope,
        with_drafts: bool,
    ) -> bool {
        match scope {
            LinkScope::LinkSet => true,
            LinkScope::Edition { locale, draft } => editions
                .get(&(source, locale.clone()))
                .and_then(|slots| slots.visible(with_drafts))
                .is_some_and(|edition| edition.state.is_draft() == *draft),
        }
    }

    /// Number of expanded-links records held.
    pub fn expanded_links_count(&self) -> usize {
        self.expanded.len()
    }
}

impl LinkGraphReader for InMemoryStore {
    fn links_from(
        &self,
        source: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        let links = self.links_read()?;
        let mut edges: Vec<LinkEdge> = links
            .edges(source, Direction::Outgoing)
            .into_iter()
            .filter(|edge| edge.scope.is_link_set() && filter.allows(&edge.link_type))
            .cloned()
            .collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn links_to(
        &self,
        target: ContentId,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        let links = self.links_read()?;
        let mut edges: Vec<LinkEdge> = links
            .edges(target, Direction::Incoming)
            .into_iter()
            .filter(|edge| edge.scope.is_link_set() && filter.allows(&edge.link_type))
            .cloned()
            .collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn edition_links_from(
        &self,
        source: ContentId,
        locale: &Locale,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        let editions = self.editions_read()?;
        let links = self.links_read()?;
        let mut edges: Vec<LinkEdge> = links
            .edges(source, Direction::Outgoing)
            .into_iter()
            .filter(|edge| {
                edge.scope.locale() == Some(locale)
                    && filter.allows(&edge.link_type)
                    && Self::edition_scope_visible(&editions, source, &edge.scope, with_drafts)
            })
            .cloned()
            .collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn edition_links_to(
        &self,
        target: ContentId,
        with_drafts: bool,
        filter: &LinkTypeFilter,
    ) -> Result<Vec<LinkEdge>, StorageError> {
        let editions = self.editions_read()?;
        let links = self.links_read()?;
        let mut edges: Vec<LinkEdge> = links
            .edges(target, Direction::Incoming)
            .into_iter()
            .filter(|edge| {
                !edge.scope.is_link_set()
                    && filter.allows(&edge.link_type)
                    && Self::edition_scope_visible(&editions, edge.source, &edge.scope, with_drafts)
            })
            .cloned()
            .collect();
        sort_edges(&mut edges);
        Ok(edges)
    }

    fn visible_edition(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
    ) -> Result<Option<Edition>, StorageError> {
        let editions = self.editions_read()?;
        Ok(editions
            .get(&(content_id, locale.clone()))
            .and_then(|slots| slots.visible(with_drafts))
            .cloned())
    }

    fn visible_locales(
        &self,
        content_id: ContentId,
        with_drafts: bool,
    ) -> Result<Vec<Locale>, StorageError> {
        let editions = self.editions_read()?;
        let locales: BTreeSet<Locale> = editions
            .iter()
            .filter(|((id, _), slots)| *id == content_id && slots.visible(with_drafts).is_some())
            .map(|((_, locale), _)| locale.clone())
            .collect();
        Ok(locales.into_iter().collect())
    }
}

impl ContentRepository for InMemoryStore {
    fn put_edition(&self, edition: Edition) -> Result<(), StorageError> {
        if edition.state == EditionState::Superseded {
            return Ok(());
        }
        let mut editions = self.editions_write()?;
        let slots = editions
            .entry((edition.content_id, edition.locale.clone()))
            .or_default();
        if edition.state.is_draft() {
            slots.draft = Some(edition);
        } else {
            let retires_draft = slots
                .draft
                .as_ref()
                .is_some_and(|draft| draft.user_facing_version <= edition.user_facing_version);
            if retires_draft {
                slots.draft = None;
            }
            slots.live = Some(edition);
        }
        Ok(())
    }

    fn remove_content(&self, content_id: ContentId) -> Result<(), StorageError> {
        {
            let mut editions = self.editions_write()?;
            editions.retain(|(id, _), slots| *id != content_id && !slots.is_empty());
        }
        let mut links = self.links_write()?;
        links.remove_outgoing(content_id, |_| true);
        Ok(())
    }

    fn add_link(&self, edge: LinkEdge) -> Result<(), StorageError> {
        let mut links = self.links_write()?;
        links.add(edge);
        Ok(())
    }

    fn replace_links(
        &self,
        source: ContentId,
        link_type: &LinkType,
        scope: &LinkScope,
        targets: &[ContentId],
    ) -> Result<Vec<ContentId>, StorageError> {
        let mut links = self.links_write()?;
        let removed =
            links.remove_outgoing(source, |edge| &edge.link_type == link_type && &edge.scope == scope);

        for (position, target) in targets.iter().enumerate() {
            let edge = LinkEdge::new(source, link_type.clone(), *target)
                .at_position(position as i32)
                .scoped(scope.clone());
            links.add(edge);
        }

        let orphans: BTreeSet<ContentId> = removed
            .into_iter()
            .map(|edge| edge.target)
            .filter(|target| !targets.contains(target))
            .collect();
        Ok(orphans.into_iter().collect())
    }
}

impl ExpandedLinksStore for InMemoryStore {
    fn locked_update(
        &self,
        key: &ExpandedLinksKey,
        payload_version: u64,
        expanded_links: &ExpandedLinks,
    ) -> Result<UpdateOutcome, StorageError> {
        let outcome = self.locks.with_lock(key, || {
            let stored = self.expanded.get(key).map(|record| record.payload_version);
            let outcome = match stored {
                None => UpdateOutcome::Created,
                Some(stored_version) if stored_version <= payload_version => {
                    UpdateOutcome::Applied {
                        previous_version: stored_version,
                    }
                }
                Some(stored_version) => return UpdateOutcome::Skipped { stored_version },
            };
            self.expanded.insert(
                key.clone(),
                ExpandedLinksRecord {
                    key: key.clone(),
                    payload_version,
                    expanded_links: expanded_links.clone(),
                },
            );
            outcome
        })?;

        if self.locks.len() > LOCK_PRUNE_THRESHOLD {
            self.locks.prune_idle();
        }
        Ok(outcome)
    }

    fn find_expanded_links(
        &self,
        key: &ExpandedLinksKey,
    ) -> Result<Option<ExpandedLinksRecord>, StorageError> {
        Ok(self.expanded.get(key).map(|record| record.clone()))
    }
}
