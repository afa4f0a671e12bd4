//! Three-way merge over trees and store keys.
//!
//! The value rule: equal sides merge trivially, a side equal to the common
//! ancestor yields the other side, anything else is a conflict. Node merges
//! recurse entry-wise so disjoint edits on one tree combine cleanly.

use std::collections::BTreeSet;

use canopy_types::{Hash, Path};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::object::{Node, NodeEntry, TreeRef};
use crate::repo::Repo;

/// The structured result of a backend merge: merged value or conflict.
///
/// Travels in ok-response bodies; a conflict here is data, not an error
/// frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome<T> {
    Merged(T),
    Conflict { path: String },
}

impl<T> MergeOutcome<T> {
    /// Returns `true` for a merged outcome.
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }
}

/// Merge optional values by the ancestor rule. `None` means conflict.
pub fn merge_option<T: PartialEq + Clone>(
    base: Option<&T>,
    ours: Option<&T>,
    theirs: Option<&T>,
) -> Option<Option<T>> {
    if ours == theirs {
        return Some(ours.cloned());
    }
    if ours == base {
        return Some(theirs.cloned());
    }
    if theirs == base {
        return Some(ours.cloned());
    }
    None
}

impl Repo {
    /// Three-way merge of two trees against a common ancestor.
    ///
    /// Returns the merged root; an irreconcilable binding fails with
    /// [`StoreError::MergeConflict`] naming the path.
    pub fn merge_trees(
        &self,
        base: Option<&TreeRef>,
        ours: &TreeRef,
        theirs: &TreeRef,
    ) -> StoreResult<TreeRef> {
        match self.merge_child(&Path::root(), base.copied(), Some(*ours), Some(*theirs))? {
            Some(merged) => Ok(merged),
            None => self.empty_tree(),
        }
    }

    fn merge_child(
        &self,
        path: &Path,
        base: Option<TreeRef>,
        ours: Option<TreeRef>,
        theirs: Option<TreeRef>,
    ) -> StoreResult<Option<TreeRef>> {
        if ours == theirs {
            return Ok(ours);
        }
        if base == ours {
            return Ok(theirs);
        }
        if base == theirs {
            return Ok(ours);
        }
        match (ours, theirs) {
            // Both sides are nodes: recurse and merge entry-wise.
            (Some(TreeRef::Node(o)), Some(TreeRef::Node(t))) => {
                let base_node = match base {
                    Some(TreeRef::Node(b)) => self.require_node(&b)?,
                    _ => Node::empty(),
                };
                let merged =
                    self.merge_nodes(path, &base_node, &self.require_node(&o)?, &self.require_node(&t)?)?;
                Ok(Some(merged))
            }
            _ => Err(StoreError::MergeConflict {
                path: path.to_string(),
            }),
        }
    }

    fn merge_nodes(
        &self,
        path: &Path,
        base: &Node,
        ours: &Node,
        theirs: &Node,
    ) -> StoreResult<TreeRef> {
        let mut steps: BTreeSet<&str> = BTreeSet::new();
        for entry in base.entries.iter().chain(&ours.entries).chain(&theirs.entries) {
            steps.insert(entry.step.as_str());
        }

        let mut entries = Vec::new();
        for step in steps {
            let child_path = path.child(step)?;
            let merged = self.merge_child(
                &child_path,
                base.get(step).map(|e| e.target),
                ours.get(step).map(|e| e.target),
                theirs.get(step).map(|e| e.target),
            )?;
            if let Some(target) = merged {
                entries.push(NodeEntry::new(step, target));
            }
        }
        Ok(TreeRef::Node(self.add_node(&Node::new(entries))?))
    }

    /// Backend merge of contents keys: the value rule on bare keys.
    pub fn merge_contents_keys(
        &self,
        base: Option<&Hash>,
        ours: Option<&Hash>,
        theirs: Option<&Hash>,
    ) -> MergeOutcome<Option<Hash>> {
        match merge_option(base, ours, theirs) {
            Some(merged) => MergeOutcome::Merged(merged),
            None => MergeOutcome::Conflict {
                path: String::new(),
            },
        }
    }

    /// Backend merge of node keys: structural merge with an empty implicit
    /// ancestor where keys are absent.
    pub fn merge_node_keys(
        &self,
        base: Option<&Hash>,
        ours: Option<&Hash>,
        theirs: Option<&Hash>,
    ) -> StoreResult<MergeOutcome<Option<Hash>>> {
        let result = self.merge_child(
            &Path::root(),
            base.map(|h| TreeRef::Node(*h)),
            ours.map(|h| TreeRef::Node(*h)),
            theirs.map(|h| TreeRef::Node(*h)),
        );
        match result {
            Ok(merged) => Ok(MergeOutcome::Merged(merged.map(|t| t.hash()))),
            Err(StoreError::MergeConflict { path }) => Ok(MergeOutcome::Conflict { path }),
            Err(other) => Err(other),
        }
    }

    /// Backend merge of commit keys: the value rule only. History-aware
    /// merging happens at the tree level.
    pub fn merge_commit_keys(
        &self,
        base: Option<&Hash>,
        ours: Option<&Hash>,
        theirs: Option<&Hash>,
    ) -> MergeOutcome<Option<Hash>> {
        match merge_option(base, ours, theirs) {
            Some(merged) => MergeOutcome::Merged(merged),
            None => MergeOutcome::Conflict {
                path: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Contents;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn merge_option_rules() {
        let (a, b, c) = (1, 2, 3);
        // Equal sides.
        assert_eq!(merge_option(Some(&a), Some(&b), Some(&b)), Some(Some(b)));
        // One side unchanged.
        assert_eq!(merge_option(Some(&a), Some(&a), Some(&b)), Some(Some(b)));
        assert_eq!(merge_option(Some(&a), Some(&b), Some(&a)), Some(Some(b)));
        // Removal against no change.
        assert_eq!(merge_option(Some(&a), None, Some(&a)), Some(None));
        // Divergent edits conflict.
        assert_eq!(merge_option(Some(&a), Some(&b), Some(&c)), None);
        assert_eq!(merge_option(None, Some(&b), Some(&c)), None);
    }

    #[test]
    fn disjoint_edits_merge() {
        let repo = Repo::in_memory();
        let base = repo.empty_tree().unwrap();
        let ours = repo.tree_add(&base, &path("a"), &Contents::from("A")).unwrap();
        let theirs = repo.tree_add(&base, &path("b"), &Contents::from("B")).unwrap();

        let merged = repo.merge_trees(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(
            repo.tree_find(&merged, &path("a")).unwrap(),
            Some(Contents::from("A"))
        );
        assert_eq!(
            repo.tree_find(&merged, &path("b")).unwrap(),
            Some(Contents::from("B"))
        );
    }

    #[test]
    fn nested_disjoint_edits_merge() {
        let repo = Repo::in_memory();
        let base = repo
            .tree_add(
                &repo.empty_tree().unwrap(),
                &path("dir/keep"),
                &Contents::from("k"),
            )
            .unwrap();
        let ours = repo.tree_add(&base, &path("dir/a"), &Contents::from("A")).unwrap();
        let theirs = repo.tree_add(&base, &path("dir/b"), &Contents::from("B")).unwrap();

        let merged = repo.merge_trees(Some(&base), &ours, &theirs).unwrap();
        for (p, v) in [("dir/keep", "k"), ("dir/a", "A"), ("dir/b", "B")] {
            assert_eq!(
                repo.tree_find(&merged, &path(p)).unwrap(),
                Some(Contents::from(v)),
                "{p}"
            );
        }
    }

    #[test]
    fn same_edit_merges() {
        let repo = Repo::in_memory();
        let base = repo.empty_tree().unwrap();
        let ours = repo.tree_add(&base, &path("k"), &Contents::from("same")).unwrap();
        let theirs = repo.tree_add(&base, &path("k"), &Contents::from("same")).unwrap();
        let merged = repo.merge_trees(Some(&base), &ours, &theirs).unwrap();
        assert_eq!(merged, ours);
    }

    #[test]
    fn divergent_edit_conflicts_with_path() {
        let repo = Repo::in_memory();
        let base = repo
            .tree_add(&repo.empty_tree().unwrap(), &path("dir/k"), &Contents::from("0"))
            .unwrap();
        let ours = repo.tree_add(&base, &path("dir/k"), &Contents::from("1")).unwrap();
        let theirs = repo.tree_add(&base, &path("dir/k"), &Contents::from("2")).unwrap();

        let err = repo.merge_trees(Some(&base), &ours, &theirs).unwrap_err();
        match err {
            StoreError::MergeConflict { path } => assert_eq!(path, "dir/k"),
            other => panic!("expected conflict, got {other}"),
        }
    }

    #[test]
    fn removal_against_no_change_merges() {
        let repo = Repo::in_memory();
        let base = repo
            .tree_add(&repo.empty_tree().unwrap(), &path("k"), &Contents::from("v"))
            .unwrap();
        let ours = repo.tree_remove(&base, &path("k")).unwrap();
        let merged = repo.merge_trees(Some(&base), &ours, &base).unwrap();
        assert!(!repo.tree_mem(&merged, &path("k")).unwrap());
    }

    #[test]
    fn no_ancestor_identical_sides_merge() {
        let repo = Repo::in_memory();
        let t = repo
            .tree_add(&repo.empty_tree().unwrap(), &path("k"), &Contents::from("v"))
            .unwrap();
        let merged = repo.merge_trees(None, &t, &t).unwrap();
        assert_eq!(merged, t);
    }

    #[test]
    fn contents_key_merge_outcomes() {
        let repo = Repo::in_memory();
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        assert_eq!(
            repo.merge_contents_keys(Some(&a), Some(&a), Some(&b)),
            MergeOutcome::Merged(Some(b))
        );
        assert!(matches!(
            repo.merge_contents_keys(None, Some(&a), Some(&b)),
            MergeOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn node_key_merge_is_structural() {
        let repo = Repo::in_memory();
        let base = repo.empty_tree().unwrap();
        let ours = repo.tree_add(&base, &path("a"), &Contents::from("A")).unwrap();
        let theirs = repo.tree_add(&base, &path("b"), &Contents::from("B")).unwrap();

        let outcome = repo
            .merge_node_keys(
                Some(&base.hash()),
                Some(&ours.hash()),
                Some(&theirs.hash()),
            )
            .unwrap();
        match outcome {
            MergeOutcome::Merged(Some(h)) => {
                let merged = TreeRef::Node(h);
                assert!(repo.tree_mem(&merged, &path("a")).unwrap());
                assert!(repo.tree_mem(&merged, &path("b")).unwrap());
            }
            other => panic!("expected merged node, got {other:?}"),
        }
    }
}
