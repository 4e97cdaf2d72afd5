//! Dependency resolution: which nodes embed a changed node?
//!
//! [`DependencyResolver`] walks the link graph backwards from a changed node,
//! breadth-first, reading the path catalog in reverse. A node reached via the
//! expansion-order path `p` embeds the changed node when it is expanded as a
//! root, so every reached node is a dependee. A backward hop along `t` is only
//! taken when `[t] ++ p` is a run of steps of some declared path.
//!
//! Which hops are allowed from a node depends on `p` only through where `p`
//! sits in each declared path ([`LinkTypeRules::window_positions`]), so each
//! node is expanded at most once per distinct position set. That keeps the
//! walk linear in the number of nodes on graphs with many parents per node,
//! and it is also what stops cycles.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use linkgraph_core::{ContentId, LinkType, LinkTypeRules, Locale, TargetStore};
use linkgraph_storage::LinkGraphReader;

use crate::error::ExpansionError;
use crate::reference::LinkReference;

/// A node whose expanded view has to be recomputed, in one locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependee {
    pub content_id: ContentId,
    pub locale: Locale,
}

/// One pending step of the backward walk.
struct Frontier {
    content_id: ContentId,
    /// Root-first link types from `content_id` down to the changed node.
    path: Vec<LinkType>,
}

pub struct DependencyResolver<R: ?Sized> {
    reference: LinkReference<R>,
}

impl<R: ?Sized> Clone for DependencyResolver<R> {
    fn clone(&self) -> Self {
        DependencyResolver {
            reference: self.reference.clone(),
        }
    }
}

impl<R: LinkGraphReader + ?Sized> DependencyResolver<R> {
    pub fn new(reader: Arc<R>, rules: Arc<LinkTypeRules>) -> Self {
        DependencyResolver {
            reference: LinkReference::new(reader, rules),
        }
    }

    /// Every dependee of `content_id` as seen from `target`, de-duplicated,
    /// in discovery order. The changed node itself is not part of the result.
    ///
    /// With a `locale`, a dependee is kept only if it has a visible edition
    /// in that locale. Without one, a dependee is returned once per visible
    /// locale. `orphaned` nodes skip the reachability walk but obey the same
    /// locale rule.
    pub fn resolve(
        &self,
        content_id: ContentId,
        locale: Option<&Locale>,
        target: TargetStore,
        orphaned: &[ContentId],
    ) -> Result<Vec<Dependee>, ExpansionError> {
        let with_drafts = target.with_drafts();
        let mut reached = self.walk(content_id)?;

        let edition_dependees = self
            .reference
            .edition_dependency_links(content_id, locale, with_drafts)?;
        reached.extend(edition_dependees.into_values().flatten());
        reached.extend(orphaned.iter().copied());
        reached.shift_remove(&content_id);

        let mut dependees = Vec::new();
        for id in reached {
            let locales = self.reference.reader().visible_locales(id, with_drafts)?;
            match locale {
                Some(locale) => {
                    if locales.contains(locale) {
                        dependees.push(Dependee {
                            content_id: id,
                            locale: locale.clone(),
                        });
                    }
                }
                None => dependees.extend(locales.into_iter().map(|locale| Dependee {
                    content_id: id,
                    locale,
                })),
            }
        }

        tracing::debug!(
            content_id = %content_id,
            locale = locale.map(Locale::as_str),
            target_store = target.as_str(),
            orphaned = orphaned.len(),
            dependees = dependees.len(),
            "resolved dependees"
        );
        Ok(dependees)
    }

    /// Breadth-first backward walk over link-set edges. Returns every node
    /// reached, in discovery order.
    fn walk(&self, changed: ContentId) -> Result<IndexSet<ContentId>, ExpansionError> {
        let rules = self.reference.rules();
        let mut reached: IndexSet<ContentId> = IndexSet::new();
        let mut queued: HashSet<(ContentId, Vec<BTreeSet<usize>>)> = HashSet::new();
        let mut queue: VecDeque<Frontier> = VecDeque::new();
        queue.push_back(Frontier {
            content_id: changed,
            path: Vec::new(),
        });

        while let Some(step) = queue.pop_front() {
            let links = self
                .reference
                .dependency_links(step.content_id, &step.path, &[changed])?;

            for (link_type, sources) in links {
                let mut path = Vec::with_capacity(step.path.len() + 1);
                path.push(link_type);
                path.extend(step.path.iter().cloned());
                let positions = rules.window_positions(&path);

                for source in sources {
                    reached.insert(source);
                    if queued.insert((source, positions.clone())) {
                        queue.push_back(Frontier {
                            content_id: source,
                            path: path.clone(),
                        });
                    }
                }
            }
        }
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use linkgraph_core::{Edition, EditionState, LinkEdge, LinkScope, LinkTypeFilter};
    use linkgraph_storage::{ContentRepository, InMemoryStore, StorageError};

    struct Fixture {
        store: Arc<InMemoryStore>,
        resolver: DependencyResolver<InMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let resolver =
                DependencyResolver::new(Arc::clone(&store), Arc::new(LinkTypeRules::standard()));
            Fixture { store, resolver }
        }

        fn node(&self, locales: &[&str]) -> ContentId {
            let id = ContentId::new_v4();
            for locale in locales {
                self.put(id, locale, EditionState::Published);
            }
            id
        }

        fn put(&self, id: ContentId, locale: &str, state: EditionState) {
            self.store
                .put_edition(Edition::new(id, Locale::from(locale), state, "guide", "Node"))
                .unwrap();
        }

        fn link(&self, from: ContentId, link_type: &str, to: ContentId) {
            self.store.add_link(LinkEdge::new(from, link_type, to)).unwrap();
        }

        fn ids(&self, changed: ContentId, locale: Option<&str>, target: TargetStore) -> Vec<ContentId> {
            let locale = locale.map(Locale::from);
            let mut ids: Vec<ContentId> = self
                .resolver
                .resolve(changed, locale.as_ref(), target, &[])
                .unwrap()
                .into_iter()
                .map(|d| d.content_id)
                .collect();
            ids.sort();
            ids.dedup();
            ids
        }
    }

    fn sorted(mut ids: Vec<ContentId>) -> Vec<ContentId> {
        ids.sort();
        ids
    }

    #[test]
    fn direct_linkers_are_dependees() {
        let f = Fixture::new();
        let org = f.node(&["en"]);
        let a = f.node(&["en"]);
        let b = f.node(&["en"]);
        f.link(a, "organisations", org);
        f.link(b, "organisations", org);

        assert_eq!(f.ids(org, Some("en"), TargetStore::Live), sorted(vec![a, b]));
    }

    #[test]
    fn reverse_embedders_are_dependees() {
        let f = Fixture::new();
        let parent = f.node(&["en"]);
        let child = f.node(&["en"]);
        f.link(child, "parent", parent);

        // The parent embeds the child under `children`.
        assert_eq!(f.ids(child, Some("en"), TargetStore::Live), vec![parent]);
    }

    #[test]
    fn walk_follows_declared_multi_hop_paths() {
        let f = Fixture::new();
        let top = f.node(&["en"]);
        let mid = f.node(&["en"]);
        let page = f.node(&["en"]);
        let unrelated = f.node(&["en"]);
        f.link(mid, "parent_taxons", top);
        f.link(page, "taxons", mid);
        // `unrelated` links to `page`, but [organisations, taxons, ...] is
        // not a declared path.
        f.link(unrelated, "organisations", page);

        let dependees = f.ids(top, Some("en"), TargetStore::Live);
        assert!(dependees.contains(&mid));
        assert!(dependees.contains(&page));
        assert!(!dependees.contains(&unrelated));
    }

    #[test]
    fn walk_terminates_on_cycles() {
        let f = Fixture::new();
        let a = f.node(&["en"]);
        let b = f.node(&["en"]);
        let c = f.node(&["en"]);
        f.link(a, "parent", b);
        f.link(b, "parent", c);
        f.link(c, "parent", a);

        let dependees = f.ids(a, Some("en"), TargetStore::Live);
        assert_eq!(dependees, sorted(vec![b, c]));
    }

    #[test]
    fn locale_scoped_change_skips_dependees_without_that_locale() {
        let f = Fixture::new();
        let changed = f.node(&["en", "fr"]);
        let english_only = f.node(&["en"]);
        let bilingual = f.node(&["en", "fr"]);
        f.link(english_only, "organisations", changed);
        f.link(bilingual, "organisations", changed);

        assert_eq!(f.ids(changed, Some("fr"), TargetStore::Live), vec![bilingual]);

        let all = f
            .resolver
            .resolve(changed, None, TargetStore::Live, &[])
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn live_change_ignores_draft_only_references() {
        let f = Fixture::new();
        let changed = f.node(&["en"]);
        let referrer = f.node(&["en"]);
        f.put(referrer, "en", EditionState::Draft);
        f.store
            .add_link(LinkEdge::new(referrer, "government", changed).scoped(LinkScope::Edition {
                locale: Locale::from("en"),
                draft: true,
            }))
            .unwrap();

        assert!(f.ids(changed, Some("en"), TargetStore::Live).is_empty());
        assert_eq!(f.ids(changed, Some("en"), TargetStore::Draft), vec![referrer]);
    }

    #[test]
    fn orphans_are_included_without_a_path() {
        let f = Fixture::new();
        let changed = f.node(&["en"]);
        let orphan = f.node(&["en"]);
        let orphan_in_other_locale = f.node(&["de"]);

        let dependees = f
            .resolver
            .resolve(
                changed,
                Some(&Locale::from("en")),
                TargetStore::Live,
                &[orphan, orphan_in_other_locale],
            )
            .unwrap();
        assert_eq!(
            dependees,
            vec![Dependee {
                content_id: orphan,
                locale: Locale::from("en"),
            }]
        );
    }

    #[test]
    fn changed_node_is_not_its_own_dependee() {
        let f = Fixture::new();
        let a = f.node(&["en"]);
        let b = f.node(&["en"]);
        f.link(a, "parent", b);
        f.link(b, "parent", a);

        assert_eq!(f.ids(a, Some("en"), TargetStore::Live), vec![b]);
    }

    /// Counts the edge queries the walk makes.
    struct CountingReader {
        inner: InMemoryStore,
        edge_queries: AtomicUsize,
    }

    impl LinkGraphReader for CountingReader {
        fn links_from(
            &self,
            source: ContentId,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.edge_queries.fetch_add(1, Ordering::Relaxed);
            self.inner.links_from(source, filter)
        }

        fn links_to(
            &self,
            target: ContentId,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.edge_queries.fetch_add(1, Ordering::Relaxed);
            self.inner.links_to(target, filter)
        }

        fn edition_links_from(
            &self,
            source: ContentId,
            locale: &Locale,
            with_drafts: bool,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.edition_links_from(source, locale, with_drafts, filter)
        }

        fn edition_links_to(
            &self,
            target: ContentId,
            with_drafts: bool,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.edition_links_to(target, with_drafts, filter)
        }

        fn visible_edition(
            &self,
            content_id: ContentId,
            locale: &Locale,
            with_drafts: bool,
        ) -> Result<Option<Edition>, StorageError> {
            self.inner.visible_edition(content_id, locale, with_drafts)
        }

        fn visible_locales(
            &self,
            content_id: ContentId,
            with_drafts: bool,
        ) -> Result<Vec<Locale>, StorageError> {
            self.inner.visible_locales(content_id, with_drafts)
        }
    }

    /// A taxonomy `layers` deep and three wide below `top`, where every
    /// taxon has every taxon of the layer above as a parent.
    fn layered_taxonomy(
        layers: usize,
    ) -> (
        DependencyResolver<CountingReader>,
        Arc<CountingReader>,
        ContentId,
        usize,
    ) {
        let reader = Arc::new(CountingReader {
            inner: InMemoryStore::new(),
            edge_queries: AtomicUsize::new(0),
        });
        let top = ContentId::new_v4();
        let mut above = vec![top];
        for _ in 0..layers {
            let layer: Vec<ContentId> = (0..3).map(|_| ContentId::new_v4()).collect();
            for &child in &layer {
                for &parent in &above {
                    reader
                        .inner
                        .add_link(LinkEdge::new(child, "parent_taxons", parent))
                        .unwrap();
                }
            }
            above = layer;
        }
        let resolver = DependencyResolver::new(Arc::clone(&reader), Arc::new(LinkTypeRules::standard()));
        (resolver, reader, top, 1 + 3 * layers)
    }

    #[test]
    fn multi_parent_walk_stays_linear() {
        for layers in [3, 6, 12] {
            let (resolver, reader, top, nodes) = layered_taxonomy(layers);
            let reached = resolver.walk(top).unwrap();

            assert_eq!(reached.len(), nodes - 1);
            let queries = reader.edge_queries.load(Ordering::Relaxed);
            assert!(
                queries <= 3 * nodes,
                "{} edge queries for {} nodes",
                queries,
                nodes
            );
        }
    }
}
