//! Per-step edge fetching shared by the expansion and dependency walks.
//!
//! Both walks ask the same question at every node: "for the link types allowed
//! at this point of the path, which nodes are linked, grouped by link type?"
//! They differ only in direction. Expansion looks at what a node embeds;
//! dependency resolution looks at who embeds a node. In both, a reverse link
//! type is answered by reading the direct type it aliases with source and
//! target swapped, and the reverse map is merged first so a direct entry with
//! the same name replaces it.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use linkgraph_core::{ContentId, LinkEdge, LinkType, LinkTypeFilter, LinkTypeRules, Locale};
use linkgraph_storage::LinkGraphReader;

use crate::error::ExpansionError;

/// Linked content ids grouped by link type, in edge order.
pub type LinksByType = IndexMap<LinkType, Vec<ContentId>>;

/// Which end of an edge is the linked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Source,
    Target,
}

pub struct LinkReference<R: ?Sized> {
    reader: Arc<R>,
    rules: Arc<LinkTypeRules>,
}

impl<R: ?Sized> Clone for LinkReference<R> {
    fn clone(&self) -> Self {
        LinkReference {
            reader: Arc::clone(&self.reader),
            rules: Arc::clone(&self.rules),
        }
    }
}

impl<R: LinkGraphReader + ?Sized> LinkReference<R> {
    pub fn new(reader: Arc<R>, rules: Arc<LinkTypeRules>) -> Self {
        LinkReference { reader, rules }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn rules(&self) -> &LinkTypeRules {
        &self.rules
    }

    // -----------------------------------------------------------------------
    // Expansion direction: what does `content_id` embed?
    // -----------------------------------------------------------------------

    /// Nodes embedded by `content_id` after `path_so_far`.
    ///
    /// At the root every direct type is fetched, plus the root reverse types
    /// and the visible edition's own links in `locale`. Deeper, only the
    /// catalog's allowed next steps are fetched; nothing at all when the path
    /// cannot be extended.
    pub fn expansion_links(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
        path_so_far: &[LinkType],
    ) -> Result<LinksByType, ExpansionError> {
        if path_so_far.is_empty() {
            let root_direct = self.rules.un_reverse(&self.rules.root_reverse_links());

            let mut reverse_edges = self
                .reader
                .links_to(content_id, &LinkTypeFilter::Only(root_direct.clone()))?;
            reverse_edges.extend(
                self.reader
                    .edition_links_to(content_id, with_drafts, &LinkTypeFilter::Only(root_direct))?
                    .into_iter()
                    .filter(|edge| edge.scope.locale() == Some(locale)),
            );

            let mut direct_edges = self.reader.links_from(content_id, &LinkTypeFilter::Any)?;
            direct_edges.extend(self.reader.edition_links_from(
                content_id,
                locale,
                with_drafts,
                &LinkTypeFilter::Any,
            )?);

            let reverse = self.group_reverse(content_id, &reverse_edges, End::Source, &[])?;
            let direct = group_direct(&direct_edges, End::Target, &[]);
            return Ok(merge(reverse, direct));
        }

        let LinkTypeFilter::Only(next) = self.rules.allowed_next_steps(path_so_far) else {
            return Ok(LinksByType::new());
        };
        if next.is_empty() {
            return Ok(LinksByType::new());
        }
        let (reverse_types, direct_types) = self.rules.partition_reverse(next);

        let reverse = if reverse_types.is_empty() {
            LinksByType::new()
        } else {
            let filter = LinkTypeFilter::Only(self.rules.un_reverse(&reverse_types));
            let edges = self.reader.links_to(content_id, &filter)?;
            self.group_reverse(content_id, &edges, End::Source, &[])?
        };
        let direct = if direct_types.is_empty() {
            LinksByType::new()
        } else {
            let edges = self
                .reader
                .links_from(content_id, &LinkTypeFilter::Only(direct_types))?;
            group_direct(&edges, End::Target, &[])
        };
        Ok(merge(reverse, direct))
    }

    // -----------------------------------------------------------------------
    // Dependency direction: who embeds `content_id`?
    // -----------------------------------------------------------------------

    /// Nodes that embed `content_id` as the first hop of `expansion_path`.
    ///
    /// `expansion_path` is the sequence a would-be root walks from the node
    /// returned here down to the changed node, so the link type a node is
    /// returned under is prepended to it. Nodes in `exclude` are left out.
    pub fn dependency_links(
        &self,
        content_id: ContentId,
        expansion_path: &[LinkType],
        exclude: &[ContentId],
    ) -> Result<LinksByType, ExpansionError> {
        let (reverse_filter, direct_filter) = if expansion_path.is_empty() {
            let root_direct = self.rules.un_reverse(&self.rules.root_reverse_links());
            (LinkTypeFilter::Only(root_direct), LinkTypeFilter::Any)
        } else {
            let LinkTypeFilter::Only(next) = self.rules.dependency_next_steps(expansion_path)
            else {
                return Ok(LinksByType::new());
            };
            if next.is_empty() {
                return Ok(LinksByType::new());
            }
            let (reverse_types, direct_types) = self.rules.partition_reverse(next);
            (
                LinkTypeFilter::Only(self.rules.un_reverse(&reverse_types)),
                LinkTypeFilter::Only(direct_types),
            )
        };

        // A node that `content_id` links to via a direct type embeds it under
        // the reverse alias; a node linking to `content_id` embeds it under
        // the direct type.
        let reverse_edges = self.reader.links_from(content_id, &reverse_filter)?;
        let direct_edges = self.reader.links_to(content_id, &direct_filter)?;

        let reverse = self.group_reverse(content_id, &reverse_edges, End::Target, exclude)?;
        let direct = group_direct(&direct_edges, End::Source, exclude);
        Ok(merge(reverse, direct))
    }

    /// Nodes whose visible edition links embed `content_id`. Edition links
    /// only count at the root of an expansion, so these are one-hop
    /// dependees and the walk does not continue from them.
    ///
    /// With a locale, only edition links in that locale are read; without
    /// one, every locale `content_id` is visible in.
    pub fn edition_dependency_links(
        &self,
        content_id: ContentId,
        locale: Option<&Locale>,
        with_drafts: bool,
    ) -> Result<LinksByType, ExpansionError> {
        let locales = match locale {
            Some(locale) => vec![locale.clone()],
            None => self.reader.visible_locales(content_id, with_drafts)?,
        };
        let root_direct = LinkTypeFilter::Only(self.rules.un_reverse(&self.rules.root_reverse_links()));

        let mut reverse_edges = Vec::new();
        for locale in &locales {
            reverse_edges.extend(self.reader.edition_links_from(
                content_id,
                locale,
                with_drafts,
                &root_direct,
            )?);
        }
        let direct_edges: Vec<LinkEdge> = self
            .reader
            .edition_links_to(content_id, with_drafts, &LinkTypeFilter::Any)?
            .into_iter()
            .filter(|edge| locale.is_none() || edge.scope.locale() == locale)
            .collect();

        let reverse = self.group_reverse(content_id, &reverse_edges, End::Target, &[])?;
        let direct = group_direct(&direct_edges, End::Source, &[]);
        Ok(merge(direct, reverse))
    }

    /// Groups edges of direct types under their reverse aliases.
    fn group_reverse(
        &self,
        content_id: ContentId,
        edges: &[LinkEdge],
        end: End,
        exclude: &[ContentId],
    ) -> Result<LinksByType, ExpansionError> {
        let mut grouped: IndexMap<LinkType, IndexSet<ContentId>> = IndexMap::new();
        for edge in edges {
            let reverse = self
                .rules
                .reverse_of(&edge.link_type)
                .ok_or_else(|| ExpansionError::Invariant {
                    content_id,
                    reason: format!("link type '{}' has no reverse alias", edge.link_type),
                })?;
            let linked = linked_node(edge, end);
            if !exclude.contains(&linked) {
                grouped.entry(reverse.clone()).or_default().insert(linked);
            }
        }
        Ok(into_lists(grouped))
    }
}

fn linked_node(edge: &LinkEdge, end: End) -> ContentId {
    match end {
        End::Source => edge.source,
        End::Target => edge.target,
    }
}

fn group_direct(edges: &[LinkEdge], end: End, exclude: &[ContentId]) -> LinksByType {
    let mut grouped: IndexMap<LinkType, IndexSet<ContentId>> = IndexMap::new();
    for edge in edges {
        let linked = linked_node(edge, end);
        if !exclude.contains(&linked) {
            grouped
                .entry(edge.link_type.clone())
                .or_default()
                .insert(linked);
        }
    }
    into_lists(grouped)
}

fn into_lists(grouped: IndexMap<LinkType, IndexSet<ContentId>>) -> LinksByType {
    grouped
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(link_type, ids)| (link_type, ids.into_iter().collect()))
        .collect()
}

/// Merges `overriding` into `base`: an entry in `overriding` replaces the
/// whole list `base` holds under the same link type.
fn merge(mut base: LinksByType, overriding: LinksByType) -> LinksByType {
    for (link_type, ids) in overriding {
        base.insert(link_type, ids);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkgraph_core::{Edition, EditionState, LinkScope};
    use linkgraph_storage::{ContentRepository, InMemoryStore};

    fn setup() -> (Arc<InMemoryStore>, LinkReference<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let reference = LinkReference::new(Arc::clone(&store), Arc::new(LinkTypeRules::standard()));
        (store, reference)
    }

    fn lt(name: &str) -> LinkType {
        LinkType::from(name)
    }

    #[test]
    fn root_reads_direct_and_reverse_links() {
        let (store, reference) = setup();
        let (page, org, child) = (ContentId::new_v4(), ContentId::new_v4(), ContentId::new_v4());
        store.add_link(LinkEdge::new(page, "organisations", org)).unwrap();
        store.add_link(LinkEdge::new(child, "parent", page)).unwrap();

        let links = reference
            .expansion_links(page, &Locale::from("en"), false, &[])
            .unwrap();
        assert_eq!(links.get(&lt("organisations")), Some(&vec![org]));
        assert_eq!(links.get(&lt("children")), Some(&vec![child]));
    }

    #[test]
    fn deeper_steps_follow_the_catalog() {
        let (store, reference) = setup();
        let (taxon, parent, other) = (ContentId::new_v4(), ContentId::new_v4(), ContentId::new_v4());
        store.add_link(LinkEdge::new(taxon, "parent_taxons", parent)).unwrap();
        store.add_link(LinkEdge::new(taxon, "organisations", other)).unwrap();

        let links = reference
            .expansion_links(taxon, &Locale::from("en"), false, &[lt("taxons")])
            .unwrap();
        assert_eq!(links.keys().cloned().collect::<Vec<_>>(), vec![lt("parent_taxons")]);

        let none = reference
            .expansion_links(taxon, &Locale::from("en"), false, &[lt("organisations")])
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn direct_entry_replaces_reverse_entry_of_the_same_name() {
        let base: LinksByType = [(lt("children"), vec![ContentId::new_v4()])].into_iter().collect();
        let winner = vec![ContentId::new_v4(), ContentId::new_v4()];
        let overriding: LinksByType = [(lt("children"), winner.clone())].into_iter().collect();

        let merged = merge(base, overriding);
        assert_eq!(merged.get(&lt("children")), Some(&winner));
    }

    #[test]
    fn dependency_links_look_the_other_way() {
        let (store, reference) = setup();
        let (org, page, parent) = (ContentId::new_v4(), ContentId::new_v4(), ContentId::new_v4());
        store.add_link(LinkEdge::new(page, "organisations", org)).unwrap();
        store.add_link(LinkEdge::new(org, "parent", parent)).unwrap();

        let links = reference.dependency_links(org, &[], &[]).unwrap();
        // `page` embeds `org` under organisations; `parent` embeds it as one
        // of its children.
        assert_eq!(links.get(&lt("organisations")), Some(&vec![page]));
        assert_eq!(links.get(&lt("children")), Some(&vec![parent]));

        let excluded = reference.dependency_links(org, &[], &[page]).unwrap();
        assert!(excluded.get(&lt("organisations")).is_none());
    }

    #[test]
    fn edition_dependency_links_respect_locale() {
        let (store, reference) = setup();
        let (target, source) = (ContentId::new_v4(), ContentId::new_v4());
        store
            .put_edition(Edition::new(
                source,
                Locale::from("cy"),
                EditionState::Published,
                "news_story",
                "Stori",
            ))
            .unwrap();
        store
            .add_link(LinkEdge::new(source, "government", target).scoped(LinkScope::Edition {
                locale: Locale::from("cy"),
                draft: false,
            }))
            .unwrap();

        let cy = reference
            .edition_dependency_links(target, Some(&Locale::from("cy")), false)
            .unwrap();
        assert_eq!(cy.get(&lt("government")), Some(&vec![source]));

        let en = reference
            .edition_dependency_links(target, Some(&Locale::from("en")), false)
            .unwrap();
        assert!(en.is_empty());
    }
}
