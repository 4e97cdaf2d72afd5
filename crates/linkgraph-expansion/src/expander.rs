//! Recursive link expansion.
//!
//! [`LinkExpander`] resolves a node's expanded-link tree: every linked node
//! with its projected fields and, recursively, its own links, as far as the
//! path catalog allows. Cycles are cut by never revisiting a node already on
//! the current path.

use std::sync::Arc;

use linkgraph_core::{
    ContentId, Edition, ExpandedLinks, ExpandedNode, LinkType, LinkTypeRules, Locale,
};
use linkgraph_storage::LinkGraphReader;

use crate::error::ExpansionError;
use crate::reference::LinkReference;

pub struct LinkExpander<R: ?Sized> {
    reference: LinkReference<R>,
}

impl<R: ?Sized> Clone for LinkExpander<R> {
    fn clone(&self) -> Self {
        LinkExpander {
            reference: self.reference.clone(),
        }
    }
}

/// The state one recursion level needs.
struct Walk<'a> {
    locale: &'a Locale,
    with_drafts: bool,
    path: Vec<LinkType>,
    ancestors: Vec<ContentId>,
}

impl<R: LinkGraphReader + ?Sized> LinkExpander<R> {
    pub fn new(reader: Arc<R>, rules: Arc<LinkTypeRules>) -> Self {
        LinkExpander {
            reference: LinkReference::new(reader, rules),
        }
    }

    pub fn rules(&self) -> &LinkTypeRules {
        self.reference.rules()
    }

    /// Expands the links of `content_id` as seen in `locale` and the given
    /// view.
    ///
    /// The root's own edition decides which edition links apply; a root
    /// whose visible edition is a redirect or gone has no links. A root with
    /// no visible edition still expands its link-set links.
    pub fn expand(
        &self,
        content_id: ContentId,
        locale: &Locale,
        with_drafts: bool,
    ) -> Result<ExpandedLinks, ExpansionError> {
        let root = self
            .reference
            .reader()
            .resolve_edition(content_id, locale, with_drafts)?;
        if root.as_ref().is_some_and(|e| e.state.resolves_empty()) {
            return Ok(ExpandedLinks::new());
        }
        let edition_locale = root.as_ref().map_or(locale, |edition| &edition.locale);

        let mut walk = Walk {
            locale: edition_locale,
            with_drafts,
            path: Vec::new(),
            ancestors: vec![content_id],
        };
        let links = self.expand_node(content_id, &mut walk)?;
        tracing::debug!(
            content_id = %content_id,
            locale = %locale,
            with_drafts,
            link_types = links.len(),
            "expanded links"
        );
        Ok(links)
    }

    fn expand_node(
        &self,
        content_id: ContentId,
        walk: &mut Walk<'_>,
    ) -> Result<ExpandedLinks, ExpansionError> {
        let grouped =
            self.reference
                .expansion_links(content_id, walk.locale, walk.with_drafts, &walk.path)?;

        let mut expanded = ExpandedLinks::new();
        for (link_type, targets) in grouped {
            walk.path.push(link_type.clone());
            let mut nodes = Vec::with_capacity(targets.len());
            for target in targets {
                if walk.ancestors.contains(&target) {
                    continue;
                }
                if let Some(node) = self.expand_target(target, &link_type, walk)? {
                    nodes.push(node);
                }
            }
            walk.path.pop();
            expanded.insert(link_type, nodes);
        }
        Ok(expanded)
    }

    /// Builds the node for `target` reached via `link_type` (the last entry
    /// of `walk.path`), or `None` when it is not shown.
    fn expand_target(
        &self,
        target: ContentId,
        link_type: &LinkType,
        walk: &mut Walk<'_>,
    ) -> Result<Option<ExpandedNode>, ExpansionError> {
        let Some(edition) = self.visible_target(target, walk)? else {
            return Ok(None);
        };

        walk.ancestors.push(target);
        let links = self.expand_node(target, walk);
        walk.ancestors.pop();
        let links = links?;

        let rules = self.reference.rules();
        let keep = !links.is_empty() || rules.is_valid_path(&walk.path);
        if !keep {
            return Ok(None);
        }
        Ok(Some(ExpandedNode {
            fields: rules.project(&edition, Some(link_type), walk.with_drafts),
            links,
        }))
    }

    /// The edition shown for a link target: the requested locale falling back
    /// to the default one. Redirects and gone editions are never shown.
    fn visible_target(
        &self,
        target: ContentId,
        walk: &Walk<'_>,
    ) -> Result<Option<Edition>, ExpansionError> {
        let edition = self
            .reference
            .reader()
            .resolve_edition(target, walk.locale, walk.with_drafts)?;
        Ok(edition.filter(|edition| !edition.state.resolves_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkgraph_core::{EditionState, LinkEdge, LinkScope};
    use linkgraph_storage::{ContentRepository, InMemoryStore};
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryStore>,
        expander: LinkExpander<InMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let expander = LinkExpander::new(Arc::clone(&store), Arc::new(LinkTypeRules::standard()));
            Fixture { store, expander }
        }

        fn node(&self, document_type: &str, title: &str) -> ContentId {
            self.node_in("en", EditionState::Published, document_type, title)
        }

        fn node_in(&self, locale: &str, state: EditionState, document_type: &str, title: &str) -> ContentId {
            let id = ContentId::new_v4();
            self.put(id, locale, state, document_type, title);
            id
        }

        fn put(&self, id: ContentId, locale: &str, state: EditionState, document_type: &str, title: &str) {
            let edition = Edition::new(id, Locale::from(locale), state, document_type, title)
                .with_base_path(format!("/{}", title.to_lowercase().replace(' ', "-")));
            self.store.put_edition(edition).unwrap();
        }

        fn link(&self, from: ContentId, link_type: &str, to: ContentId) {
            self.store.add_link(LinkEdge::new(from, link_type, to)).unwrap();
        }

        fn expand(&self, id: ContentId) -> ExpandedLinks {
            self.expander.expand(id, &Locale::from("en"), false).unwrap()
        }
    }

    fn titles(nodes: Option<&[ExpandedNode]>) -> Vec<String> {
        nodes
            .unwrap_or_default()
            .iter()
            .filter_map(|node| node.field("title").and_then(|t| t.as_str()).map(String::from))
            .collect()
    }

    #[test]
    fn embeds_projected_fields_of_direct_links() {
        let f = Fixture::new();
        let page = f.node("guide", "Page");
        let org = f.node("organisation", "HMRC");
        f.link(page, "organisations", org);

        let links = f.expand(page);
        let orgs = links.get("organisations").unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].field("title"), Some(&json!("HMRC")));
        assert_eq!(orgs[0].field("base_path"), Some(&json!("/hmrc")));
        // Organisations do not embed public_updated_at.
        assert!(orgs[0].field("public_updated_at").is_none());
        assert!(orgs[0].links.is_empty());
    }

    #[test]
    fn reverse_alias_returns_exactly_the_linking_nodes() {
        let f = Fixture::new();
        let parent = f.node("mainstream_browse_page", "Parent");
        let a = f.node("mainstream_browse_page", "Child A");
        let b = f.node("mainstream_browse_page", "Child B");
        let unrelated = f.node("mainstream_browse_page", "Unrelated");
        f.link(a, "parent", parent);
        f.link(b, "parent", parent);
        f.link(unrelated, "parent", a);

        let links = f.expand(parent);
        let mut children = titles(links.get("children"));
        children.sort();
        assert_eq!(children, vec!["Child A", "Child B"]);
    }

    #[test]
    fn recurring_path_walks_the_whole_parent_chain() {
        let f = Fixture::new();
        let leaf = f.node("taxon", "Leaf");
        let mid = f.node("taxon", "Mid");
        let top = f.node("taxon", "Top");
        f.link(leaf, "parent_taxons", mid);
        f.link(mid, "parent_taxons", top);

        let links = f.expand(leaf);
        let parents = links.get("parent_taxons").unwrap();
        assert_eq!(titles(Some(parents)), vec!["Mid"]);
        assert_eq!(titles(parents[0].links.get("parent_taxons")), vec!["Top"]);
    }

    #[test]
    fn cycles_terminate_without_revisiting_ancestors() {
        let f = Fixture::new();
        let a = f.node("taxon", "A");
        let b = f.node("taxon", "B");
        f.link(a, "parent_taxons", b);
        f.link(b, "parent_taxons", a);

        let links = f.expand(a);
        let parents = links.get("parent_taxons").unwrap();
        assert_eq!(titles(Some(parents)), vec!["B"]);
        // B's parent is A, the root: not expanded again.
        assert!(parents[0].links.is_empty());
        // B also shows up as A's child taxon, again without A beneath it.
        assert_eq!(titles(links.get("child_taxons")), vec!["B"]);
        assert!(!links.content_ids().contains(&a.to_string()));
    }

    #[test]
    fn paths_outside_the_catalog_stop_after_one_hop() {
        let f = Fixture::new();
        let page = f.node("guide", "Page");
        let org = f.node("organisation", "Org");
        let parent_org = f.node("organisation", "Parent org");
        f.link(page, "organisations", org);
        f.link(org, "ordered_parent_organisations", parent_org);

        let links = f.expand(page);
        let orgs = links.get("organisations").unwrap();
        assert!(orgs[0].links.is_empty());
    }

    #[test]
    fn bridge_nodes_without_a_full_path_are_dropped() {
        let f = Fixture::new();
        let page = f.node("guide", "Page");
        let item = f.node("guide", "Related");
        let browse = f.node("mainstream_browse_page", "Browse");
        f.link(page, "ordered_related_items", item);
        f.link(item, "mainstream_browse_pages", browse);

        // [ordered_related_items, mainstream_browse_pages] is only a prefix
        // of a declared path and the browse page has no parent to reach.
        let links = f.expand(page);
        let related = links.get("ordered_related_items").unwrap();
        assert_eq!(titles(Some(related)), vec!["Related"]);
        assert!(related[0].links.is_empty());

        let top = f.node("mainstream_browse_page", "Top");
        f.link(browse, "parent", top);
        let links = f.expand(page);
        let related = links.get("ordered_related_items").unwrap();
        let browse_pages = related[0].links.get("mainstream_browse_pages").unwrap();
        assert_eq!(titles(Some(browse_pages)), vec!["Browse"]);
        assert_eq!(titles(browse_pages[0].links.get("parent")), vec!["Top"]);
    }

    #[test]
    fn redirects_and_missing_targets_are_omitted() {
        let f = Fixture::new();
        let page = f.node("guide", "Page");
        let gone = f.node_in("en", EditionState::Gone, "gone", "Gone");
        let missing = ContentId::new_v4();
        let kept = f.node("organisation", "Kept");
        f.link(page, "organisations", gone);
        f.link(page, "organisations", missing);
        f.link(page, "organisations", kept);

        assert_eq!(titles(f.expand(page).get("organisations")), vec!["Kept"]);
    }

    #[test]
    fn redirect_root_has_no_links() {
        let f = Fixture::new();
        let root = f.node_in("en", EditionState::Redirect, "redirect", "Moved");
        let org = f.node("organisation", "Org");
        f.link(root, "organisations", org);
        assert!(f.expand(root).is_empty());
    }

    #[test]
    fn targets_fall_back_to_english() {
        let f = Fixture::new();
        let page = f.node_in("fr", EditionState::Published, "guide", "Page");
        let org = f.node("organisation", "Org");
        f.put(org, "fr", EditionState::Published, "organisation", "Organisation");
        let person = f.node("person", "Person");
        f.link(page, "organisations", org);
        f.link(page, "people", person);

        let links = f.expander.expand(page, &Locale::from("fr"), false).unwrap();
        assert_eq!(titles(links.get("organisations")), vec!["Organisation"]);
        assert_eq!(titles(links.get("people")), vec!["Person"]);
        assert_eq!(
            links.get("people").unwrap()[0].field("locale"),
            Some(&json!("en"))
        );
    }

    #[test]
    fn draft_view_sees_draft_only_targets_and_fields() {
        let f = Fixture::new();
        let page = f.node("guide", "Page");
        let nav = f.node_in("en", EditionState::Draft, "step_by_step_nav", "Nav");
        f.link(nav, "pages_part_of_step_nav", page);

        assert!(f.expand(page).get("part_of_step_navs").is_none());

        let draft = f.expander.expand(page, &Locale::from("en"), true).unwrap();
        let navs = draft.get("part_of_step_navs").unwrap();
        assert_eq!(titles(Some(navs)), vec!["Nav"]);
        assert_eq!(navs[0].field("auth_bypass_ids"), Some(&json!([])));
    }

    #[test]
    fn edition_links_apply_at_the_root_only() {
        let f = Fixture::new();
        let page = f.node("news_story", "Page");
        let government = f.node("government", "Government");
        let en = Locale::from("en");
        f.store
            .add_link(LinkEdge::new(page, "government", government).scoped(LinkScope::Edition {
                locale: en.clone(),
                draft: false,
            }))
            .unwrap();

        let links = f.expand(page);
        assert_eq!(titles(links.get("government")), vec!["Government"]);

        let other = f.node("guide", "Other");
        f.link(other, "ordered_related_items", page);
        let via = f.expand(other);
        let related = via.get("ordered_related_items").unwrap();
        assert!(related[0].links.is_empty());
    }
}
