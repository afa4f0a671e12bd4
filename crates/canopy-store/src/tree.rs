//! Trees: the lazy ref-or-concrete value and the path algebra over a repo.
//!
//! Updates are persistent: a graft writes the modified spine into the node
//! store and returns a new root key; the source tree stays valid. Reads
//! hydrate one node at a time.

use std::collections::BTreeMap;

use canopy_types::{Hash, Path};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::object::{Contents, Node, NodeEntry, TreeRef};
use crate::repo::Repo;
use crate::traits::ObjectStore as _;

/// A concrete, fully materialized tree: nested maps of steps to
/// contents-or-subtree. This is the form that travels to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalTree {
    Contents(Contents),
    Node(BTreeMap<String, LocalTree>),
}

impl LocalTree {
    /// An empty concrete tree.
    pub fn empty() -> Self {
        Self::Node(BTreeMap::new())
    }
}

/// A server-side tree value: either a reference into the store or a
/// concrete local tree not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tree {
    Ref(TreeRef),
    Local(LocalTree),
}

impl Repo {
    /// A key to the empty tree.
    pub fn empty_tree(&self) -> StoreResult<TreeRef> {
        Ok(TreeRef::Node(self.add_node(&Node::empty())?))
    }

    /// Resolve a tree value to a stored key, persisting local trees.
    pub fn resolve_tree(&self, tree: &Tree) -> StoreResult<TreeRef> {
        match tree {
            Tree::Ref(r) => Ok(*r),
            Tree::Local(local) => self.of_local(local),
        }
    }

    /// Persist a concrete tree, returning its key.
    pub fn of_local(&self, local: &LocalTree) -> StoreResult<TreeRef> {
        match local {
            LocalTree::Contents(c) => Ok(TreeRef::Contents(self.add_contents(c)?)),
            LocalTree::Node(children) => {
                let mut entries = Vec::with_capacity(children.len());
                for (step, child) in children {
                    entries.push(NodeEntry::new(step.clone(), self.of_local(child)?));
                }
                Ok(TreeRef::Node(self.add_node(&Node::new(entries))?))
            }
        }
    }

    /// Materialize a stored tree into its concrete form.
    pub fn to_local(&self, tree: &TreeRef) -> StoreResult<LocalTree> {
        match tree {
            TreeRef::Contents(h) => {
                let contents = self.contents_of(h)?.ok_or(StoreError::NotFound {
                    kind: crate::object::ObjectKind::Contents,
                    hash: *h,
                })?;
                Ok(LocalTree::Contents(contents))
            }
            TreeRef::Node(h) => {
                let node = self.require_node(h)?;
                let mut children = BTreeMap::new();
                for entry in &node.entries {
                    children.insert(entry.step.clone(), self.to_local(&entry.target)?);
                }
                Ok(LocalTree::Node(children))
            }
        }
    }

    /// The subtree (any kind) bound at `path`, if any.
    pub fn tree_find_ref(&self, at: &TreeRef, path: &Path) -> StoreResult<Option<TreeRef>> {
        let Some((step, rest)) = path.split_first() else {
            return Ok(Some(*at));
        };
        match at {
            TreeRef::Contents(_) => Ok(None),
            TreeRef::Node(h) => match self.require_node(h)?.get(step) {
                Some(entry) => self.tree_find_ref(&entry.target, &rest),
                None => Ok(None),
            },
        }
    }

    /// The contents bound at `path`, if any.
    pub fn tree_find(&self, at: &TreeRef, path: &Path) -> StoreResult<Option<Contents>> {
        match self.tree_find_ref(at, path)? {
            Some(TreeRef::Contents(h)) => {
                Ok(Some(self.contents_of(&h)?.ok_or(StoreError::NotFound {
                    kind: crate::object::ObjectKind::Contents,
                    hash: h,
                })?))
            }
            _ => Ok(None),
        }
    }

    /// Whether contents are bound at `path`.
    pub fn tree_mem(&self, at: &TreeRef, path: &Path) -> StoreResult<bool> {
        Ok(matches!(
            self.tree_find_ref(at, path)?,
            Some(TreeRef::Contents(_))
        ))
    }

    /// Whether anything (contents or subtree) is bound at `path`.
    pub fn tree_mem_tree(&self, at: &TreeRef, path: &Path) -> StoreResult<bool> {
        Ok(self.tree_find_ref(at, path)?.is_some())
    }

    /// The entries of the node at `path`; empty if `path` is unbound or
    /// bound to contents.
    pub fn tree_list(&self, at: &TreeRef, path: &Path) -> StoreResult<Vec<NodeEntry>> {
        match self.tree_find_ref(at, path)? {
            Some(TreeRef::Node(h)) => Ok(self.require_node(&h)?.entries),
            _ => Ok(Vec::new()),
        }
    }

    /// Bind contents at a non-empty `path`, returning the new root.
    pub fn tree_add(&self, at: &TreeRef, path: &Path, contents: &Contents) -> StoreResult<TreeRef> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath(
                "cannot bind contents at the root".into(),
            ));
        }
        let target = TreeRef::Contents(self.add_contents(contents)?);
        self.graft(at, path, Some(target))
    }

    /// Graft a subtree at `path`, returning the new root.
    pub fn tree_add_tree(&self, at: &TreeRef, path: &Path, other: &TreeRef) -> StoreResult<TreeRef> {
        self.graft(at, path, Some(*other))
    }

    /// Remove the binding at `path`, returning the new root. Intermediate
    /// nodes left empty by the removal are pruned.
    pub fn tree_remove(&self, at: &TreeRef, path: &Path) -> StoreResult<TreeRef> {
        self.graft(at, path, None)
    }

    /// Rebind `path` to `target` (`None` removes), rebuilding the spine.
    pub(crate) fn graft(
        &self,
        at: &TreeRef,
        path: &Path,
        target: Option<TreeRef>,
    ) -> StoreResult<TreeRef> {
        let Some((step, rest)) = path.split_first() else {
            return match target {
                Some(t) => Ok(t),
                None => self.empty_tree(),
            };
        };
        let node = match at {
            TreeRef::Node(h) => self.require_node(h)?,
            // Grafting below a contents binding replaces it with a node.
            TreeRef::Contents(_) => Node::empty(),
        };
        let child = node.get(step).map(|e| e.target);
        let new_child = if rest.is_empty() {
            target
        } else {
            let base = match child {
                Some(t) => t,
                None => self.empty_tree()?,
            };
            let grafted = self.graft(&base, &rest, target)?;
            if target.is_none() && self.is_empty_node(&grafted)? {
                None
            } else {
                Some(grafted)
            }
        };
        let new_node = match new_child {
            Some(t) => node.with_entry(step, t),
            None => node.without_entry(step),
        };
        Ok(TreeRef::Node(self.add_node(&new_node)?))
    }

    /// Apply a graft to an optional root, returning the node key of the new
    /// root. Roots must be nodes.
    pub(crate) fn graft_root(
        &self,
        root: Option<TreeRef>,
        path: &Path,
        target: Option<TreeRef>,
    ) -> StoreResult<Hash> {
        let base = match root {
            Some(r) => r,
            None => self.empty_tree()?,
        };
        match self.graft(&base, path, target)? {
            TreeRef::Node(h) => Ok(h),
            TreeRef::Contents(_) => Err(StoreError::InvalidPath(
                "the root of a branch must be a tree node".into(),
            )),
        }
    }

    /// Hydrate a tree key from a bare hash, trying nodes before contents.
    pub fn tree_of_hash(&self, hash: &Hash) -> StoreResult<Option<TreeRef>> {
        if self.nodes().mem(hash)? {
            Ok(Some(TreeRef::Node(*hash)))
        } else if self.contents().mem(hash)? {
            Ok(Some(TreeRef::Contents(*hash)))
        } else {
            Ok(None)
        }
    }

    /// The root tree of a commit.
    pub fn tree_of_commit(&self, hash: &Hash) -> StoreResult<TreeRef> {
        Ok(TreeRef::Node(self.require_commit(hash)?.tree))
    }

    fn is_empty_node(&self, tree: &TreeRef) -> StoreResult<bool> {
        match tree {
            TreeRef::Node(h) => Ok(self.require_node(h)?.is_empty()),
            TreeRef::Contents(_) => Ok(false),
        }
    }
}
