//! Expansion paths: declared sequences of link-type hops.
//!
//! A step may be marked recurring, meaning it can be taken one or more times
//! in a row (walking up a parent chain). Matching a traversed sequence against
//! a path is a small NFA walk over step positions, so recurring steps never
//! need unrolling and an unbounded sequence of recurring hops still matches.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::LinkType;

/// One hop in an [`ExpansionPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub link_type: LinkType,
    #[serde(default)]
    pub recurring: bool,
}

impl PathStep {
    pub fn once(link_type: impl Into<LinkType>) -> Self {
        PathStep {
            link_type: link_type.into(),
            recurring: false,
        }
    }

    pub fn recurring(link_type: impl Into<LinkType>) -> Self {
        PathStep {
            link_type: link_type.into(),
            recurring: true,
        }
    }
}

/// A declared multi-hop expansion path.
///
/// Written in text form as `taxons > parent_taxons* > root_taxon`, where `*`
/// marks a recurring step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpansionPath(SmallVec<[PathStep; 3]>);

impl ExpansionPath {
    pub fn new(steps: Vec<PathStep>) -> Result<Self, CoreError> {
        if steps.is_empty() {
            return Err(CoreError::InvalidRules {
                reason: "expansion path has no steps".into(),
            });
        }
        Ok(ExpansionPath(SmallVec::from_vec(steps)))
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Step positions reachable after consuming `traversed`, starting from
    /// `start`. Position `i` means "the next hop must match step `i`";
    /// position `len` means the whole path has been consumed.
    fn advance(&self, start: BTreeSet<usize>, traversed: &[LinkType]) -> BTreeSet<usize> {
        let mut positions = start;
        for link_type in traversed {
            let mut next = BTreeSet::new();
            for &i in &positions {
                if let Some(step) = self.0.get(i) {
                    if &step.link_type == link_type {
                        next.insert(i + 1);
                        if step.recurring {
                            next.insert(i);
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            positions = next;
        }
        positions
    }

    fn positions_after(&self, traversed: &[LinkType]) -> BTreeSet<usize> {
        self.advance(BTreeSet::from([0usize]), traversed)
    }

    /// Returns `true` if `traversed` is a prefix of this path (the empty
    /// sequence is a prefix of every path).
    pub fn matches_prefix(&self, traversed: &[LinkType]) -> bool {
        !self.positions_after(traversed).is_empty()
    }

    /// Returns `true` if `traversed` consumes this path completely.
    pub fn matches_exactly(&self, traversed: &[LinkType]) -> bool {
        self.positions_after(traversed).contains(&self.0.len())
    }

    /// Returns `true` if `traversed` matches a contiguous run of steps
    /// starting anywhere in this path.
    pub fn matches_window(&self, traversed: &[LinkType]) -> bool {
        if traversed.is_empty() {
            return true;
        }
        !self.advance((0..self.0.len()).collect(), traversed).is_empty()
    }

    /// Step positions from which `traversed` matches a contiguous run of
    /// steps. Non-empty exactly when [`Self::matches_window`] holds for a
    /// non-empty `traversed`.
    pub fn window_starts(&self, traversed: &[LinkType]) -> BTreeSet<usize> {
        (0..self.0.len())
            .filter(|&i| !self.advance(BTreeSet::from([i]), traversed).is_empty())
            .collect()
    }

    /// Link types that may follow `traversed` on this path.
    pub fn next_steps(&self, traversed: &[LinkType]) -> Vec<LinkType> {
        self.positions_after(traversed)
            .into_iter()
            .filter_map(|i| self.0.get(i).map(|step| step.link_type.clone()))
            .collect()
    }
}

impl FromStr for ExpansionPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = s
            .split('>')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.strip_suffix('*') {
                Some(name) => PathStep::recurring(name.trim()),
                None => PathStep::once(part),
            })
            .collect();
        ExpansionPath::new(steps)
    }
}

impl fmt::Display for ExpansionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{}", step.link_type)?;
            if step.recurring {
                write!(f, "*")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ExpansionPath {
        s.parse().unwrap()
    }

    fn types(names: &[&str]) -> Vec<LinkType> {
        names.iter().map(|n| LinkType::from(*n)).collect()
    }

    #[test]
    fn parses_recurring_marker() {
        let p = path("taxons > parent_taxons* > root_taxon");
        assert_eq!(p.steps().len(), 3);
        assert!(!p.steps()[0].recurring);
        assert!(p.steps()[1].recurring);
        assert_eq!(p.to_string(), "taxons > parent_taxons* > root_taxon");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(" > ".parse::<ExpansionPath>().is_err());
    }

    #[test]
    fn recurring_step_absorbs_repeats() {
        let p = path("taxons > parent_taxons* > root_taxon");
        let walked = types(&["taxons", "parent_taxons", "parent_taxons", "parent_taxons"]);
        assert!(p.matches_prefix(&walked));
        assert!(!p.matches_exactly(&walked));

        let mut next = p.next_steps(&walked);
        next.sort();
        assert_eq!(next, types(&["parent_taxons", "root_taxon"]));

        let full = types(&["taxons", "parent_taxons", "parent_taxons", "root_taxon"]);
        assert!(p.matches_exactly(&full));
        assert!(p.next_steps(&full).is_empty());
    }

    #[test]
    fn recurring_step_needs_at_least_one_hop() {
        let p = path("taxons > parent_taxons* > root_taxon");
        assert!(!p.matches_prefix(&types(&["taxons", "root_taxon"])));
    }

    #[test]
    fn trailing_recurring_step_matches_exactly_at_every_depth() {
        let p = path("parent*");
        for depth in 1..6 {
            let walked = vec![LinkType::from("parent"); depth];
            assert!(p.matches_exactly(&walked));
            assert_eq!(p.next_steps(&walked), types(&["parent"]));
        }
    }

    proptest::proptest! {
        #[test]
        fn extending_by_a_next_step_stays_a_prefix(
            walked in proptest::collection::vec(0usize..3, 0..8)
        ) {
            let alphabet = ["taxons", "parent_taxons", "root_taxon"];
            let p = path("taxons > parent_taxons* > root_taxon");
            let walked: Vec<LinkType> = walked.iter().map(|&i| LinkType::from(alphabet[i])).collect();

            if p.matches_exactly(&walked) {
                proptest::prop_assert!(p.matches_prefix(&walked));
            }
            for next in p.next_steps(&walked) {
                let mut extended = walked.clone();
                extended.push(next);
                proptest::prop_assert!(p.matches_prefix(&extended));
            }
        }
    }

    #[test]
    fn windows_may_start_mid_path() {
        let p = path("ordered_related_items > mainstream_browse_pages > parent*");
        assert!(p.matches_window(&types(&["mainstream_browse_pages", "parent", "parent"])));
        assert!(p.matches_window(&types(&["parent"])));
        assert!(!p.matches_prefix(&types(&["mainstream_browse_pages", "parent"])));
        assert!(!p.matches_window(&types(&["parent", "mainstream_browse_pages"])));
    }

    #[test]
    fn window_starts_settle_on_recurring_steps() {
        let p = path("taxons > parent_taxons* > root_taxon");
        let one = p.window_starts(&types(&["parent_taxons"]));
        assert_eq!(one, BTreeSet::from([1]));
        assert_eq!(p.window_starts(&types(&["parent_taxons", "parent_taxons", "root_taxon"])), one);
        assert_eq!(p.window_starts(&types(&["taxons", "parent_taxons"])), BTreeSet::from([0]));
        assert!(p.window_starts(&types(&["root_taxon", "taxons"])).is_empty());
    }

    #[test]
    fn non_recurring_step_is_taken_once() {
        let p = path("role_appointments > person");
        assert!(p.matches_exactly(&types(&["role_appointments", "person"])));
        assert!(!p.matches_prefix(&types(&["role_appointments", "person", "person"])));
        assert!(!p.matches_prefix(&types(&["person"])));
    }
}
