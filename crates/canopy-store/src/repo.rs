//! The repository: four object stores behind one handle, plus the
//! branch-scoped view that runs the optimistic commit loop.

use std::sync::Arc;

use canopy_types::{CommitInfo, Hash, Path};

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryBranchStore, InMemoryObjectStore};
use crate::object::{Commit, Contents, Node, ObjectKind, TreeRef};
use crate::traits::{BranchStore, ObjectStore};

/// Options for opening a repository.
#[derive(Clone, Debug)]
pub struct RepoOptions {
    /// The branch new sessions start on.
    pub default_branch: String,
    /// Backend-specific: expose a lower storage layer. The in-memory
    /// backend has none and ignores this.
    pub with_lower_layer: bool,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            default_branch: "main".into(),
            with_lower_layer: false,
        }
    }
}

/// A repository: content, node, and commit stores plus the branch registry.
///
/// Shared by every session of a server process; all mutation goes through
/// the stores' own atomic operations.
pub struct Repo {
    contents: Arc<dyn ObjectStore>,
    nodes: Arc<dyn ObjectStore>,
    commits: Arc<dyn ObjectStore>,
    branches: Arc<dyn BranchStore>,
    default_branch: String,
}

impl Repo {
    /// Open a repository over the in-memory backend.
    pub fn open(options: RepoOptions) -> Self {
        if options.with_lower_layer {
            tracing::debug!("in-memory backend has no lower layer; ignoring with_lower_layer");
        }
        Self {
            contents: Arc::new(InMemoryObjectStore::new()),
            nodes: Arc::new(InMemoryObjectStore::new()),
            commits: Arc::new(InMemoryObjectStore::new()),
            branches: Arc::new(InMemoryBranchStore::new()),
            default_branch: options.default_branch,
        }
    }

    /// Open with default options.
    pub fn in_memory() -> Self {
        Self::open(RepoOptions::default())
    }

    pub fn contents(&self) -> &dyn ObjectStore {
        &*self.contents
    }

    pub fn nodes(&self) -> &dyn ObjectStore {
        &*self.nodes
    }

    pub fn commits(&self) -> &dyn ObjectStore {
        &*self.commits
    }

    pub fn branches(&self) -> &dyn BranchStore {
        &*self.branches
    }

    /// The branch new sessions start on.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    // -- typed object access ------------------------------------------------

    /// Load contents by key.
    pub fn contents_of(&self, hash: &Hash) -> StoreResult<Option<Contents>> {
        match self.contents.find(hash)? {
            Some(obj) => Ok(Some(Contents::from_stored_object(&obj)?)),
            None => Ok(None),
        }
    }

    /// Load a node by key.
    pub fn node_of(&self, hash: &Hash) -> StoreResult<Option<Node>> {
        match self.nodes.find(hash)? {
            Some(obj) => Ok(Some(Node::from_stored_object(&obj)?)),
            None => Ok(None),
        }
    }

    /// Load a commit by key.
    pub fn commit_of(&self, hash: &Hash) -> StoreResult<Option<Commit>> {
        match self.commits.find(hash)? {
            Some(obj) => Ok(Some(Commit::from_stored_object(&obj)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn require_node(&self, hash: &Hash) -> StoreResult<Node> {
        self.node_of(hash)?.ok_or(StoreError::NotFound {
            kind: ObjectKind::Node,
            hash: *hash,
        })
    }

    pub(crate) fn require_commit(&self, hash: &Hash) -> StoreResult<Commit> {
        self.commit_of(hash)?.ok_or(StoreError::NotFound {
            kind: ObjectKind::Commit,
            hash: *hash,
        })
    }

    /// Store contents, returning its key.
    pub fn add_contents(&self, contents: &Contents) -> StoreResult<Hash> {
        self.contents.add(&contents.to_stored_object())
    }

    /// Store a node, returning its key.
    pub fn add_node(&self, node: &Node) -> StoreResult<Hash> {
        self.nodes.add(&node.to_stored_object()?)
    }

    /// Store a commit object, returning its key. Use [`Repo::new_commit`]
    /// to validate references first.
    pub fn add_commit(&self, commit: &Commit) -> StoreResult<Hash> {
        self.commits.add(&commit.to_stored_object()?)
    }

    /// Create a commit after checking that every parent resolves in the
    /// commit store and the tree resolves in the node store.
    pub fn new_commit(
        &self,
        info: CommitInfo,
        parents: Vec<Hash>,
        tree: Hash,
    ) -> StoreResult<Hash> {
        for parent in &parents {
            if !self.commits.mem(parent)? {
                return Err(StoreError::UnknownParent(*parent));
            }
        }
        if !self.nodes.mem(&tree)? {
            return Err(StoreError::NotFound {
                kind: ObjectKind::Node,
                hash: tree,
            });
        }
        self.add_commit(&Commit::new(info, parents, tree))
    }

    // -- branch heads -------------------------------------------------------

    /// The commit a branch points at, if any.
    pub fn head(&self, branch: &str) -> StoreResult<Option<Hash>> {
        self.branches.find(branch)
    }

    /// Atomically point a branch at an existing commit.
    pub fn set_head(&self, branch: &str, commit: Hash) -> StoreResult<()> {
        if !self.commits.mem(&commit)? {
            return Err(StoreError::NotFound {
                kind: ObjectKind::Commit,
                hash: commit,
            });
        }
        self.branches.set(branch, commit)
    }

    /// Remove a branch mapping. Returns `true` if it existed.
    pub fn remove_branch(&self, branch: &str) -> StoreResult<bool> {
        self.branches.remove(branch)
    }

    pub(crate) fn root_of_head(&self, head: Option<&Hash>) -> StoreResult<Option<TreeRef>> {
        match head {
            None => Ok(None),
            Some(h) => Ok(Some(TreeRef::Node(self.require_commit(h)?.tree))),
        }
    }
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("default_branch", &self.default_branch)
            .finish()
    }
}

/// A read/write view of one branch.
///
/// Mutations run the optimistic commit loop: build a commit against the
/// observed head and compare-and-swap the branch; if another writer advanced
/// the head in between, rebuild against the new head and retry.
#[derive(Clone)]
pub struct BranchView {
    repo: Arc<Repo>,
    branch: String,
}

impl BranchView {
    pub fn new(repo: Arc<Repo>, branch: impl Into<String>) -> Self {
        Self {
            repo,
            branch: branch.into(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn repo(&self) -> &Arc<Repo> {
        &self.repo
    }

    /// The root tree of the branch head, if the branch exists.
    pub fn root(&self) -> StoreResult<Option<TreeRef>> {
        let head = self.repo.head(&self.branch)?;
        self.repo.root_of_head(head.as_ref())
    }

    /// The contents bound at `path`, if any.
    pub fn find(&self, path: &Path) -> StoreResult<Option<Contents>> {
        match self.root()? {
            Some(root) => self.repo.tree_find(&root, path),
            None => Ok(None),
        }
    }

    /// Whether contents are bound at `path`.
    pub fn mem(&self, path: &Path) -> StoreResult<bool> {
        match self.root()? {
            Some(root) => self.repo.tree_mem(&root, path),
            None => Ok(false),
        }
    }

    /// Whether anything (contents or subtree) is bound at `path`.
    pub fn mem_tree(&self, path: &Path) -> StoreResult<bool> {
        match self.root()? {
            Some(root) => self.repo.tree_mem_tree(&root, path),
            None => Ok(false),
        }
    }

    /// The subtree at `path`, if any.
    pub fn find_tree(&self, path: &Path) -> StoreResult<Option<TreeRef>> {
        match self.root()? {
            Some(root) => self.repo.tree_find_ref(&root, path),
            None => Ok(None),
        }
    }

    /// Bind contents at `path`, producing a new commit.
    pub fn set(&self, path: &Path, info: &CommitInfo, contents: &Contents) -> StoreResult<Hash> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath(
                "cannot bind contents at the root".into(),
            ));
        }
        let target = TreeRef::Contents(self.repo.add_contents(contents)?);
        self.commit_update(info, |root| self.repo.graft_root(root, path, Some(target)))
    }

    /// Graft a tree at `path`, producing a new commit.
    pub fn set_tree(&self, path: &Path, info: &CommitInfo, tree: &TreeRef) -> StoreResult<Hash> {
        let target = *tree;
        self.commit_update(info, |root| self.repo.graft_root(root, path, Some(target)))
    }

    /// Remove the binding at `path`, producing a new commit.
    pub fn remove(&self, path: &Path, info: &CommitInfo) -> StoreResult<Hash> {
        self.commit_update(info, |root| self.repo.graft_root(root, path, None))
    }

    /// Atomic compare-and-swap of the contents at `path`.
    ///
    /// Succeeds (one commit, `true`) iff the observed value equals `test`
    /// and nobody advances the head meanwhile. Fails cleanly with `false`
    /// otherwise: no retry, and the branch is left unchanged.
    pub fn test_and_set(
        &self,
        path: &Path,
        info: &CommitInfo,
        test: Option<&Contents>,
        set: Option<&Contents>,
    ) -> StoreResult<bool> {
        let head = self.repo.head(&self.branch)?;
        let root = self.repo.root_of_head(head.as_ref())?;
        let current = match &root {
            Some(r) => self.repo.tree_find(r, path)?,
            None => None,
        };
        if current.as_ref() != test {
            return Ok(false);
        }
        let target = match set {
            Some(c) => Some(TreeRef::Contents(self.repo.add_contents(c)?)),
            None => None,
        };
        let tree = self.repo.graft_root(root, path, target)?;
        let commit = Commit::new(info.clone(), head.iter().copied().collect(), tree);
        let new_head = self.repo.add_commit(&commit)?;
        self.repo
            .branches()
            .test_and_set(&self.branch, head.as_ref(), Some(&new_head))
    }

    /// Atomic compare-and-swap of the subtree at `path`.
    pub fn test_and_set_tree(
        &self,
        path: &Path,
        info: &CommitInfo,
        test: Option<&TreeRef>,
        set: Option<&TreeRef>,
    ) -> StoreResult<bool> {
        let head = self.repo.head(&self.branch)?;
        let root = self.repo.root_of_head(head.as_ref())?;
        let current = match &root {
            Some(r) => self.repo.tree_find_ref(r, path)?,
            None => None,
        };
        if current.as_ref() != test {
            return Ok(false);
        }
        let tree = self.repo.graft_root(root, path, set.copied())?;
        let commit = Commit::new(info.clone(), head.iter().copied().collect(), tree);
        let new_head = self.repo.add_commit(&commit)?;
        self.repo
            .branches()
            .test_and_set(&self.branch, head.as_ref(), Some(&new_head))
    }

    fn commit_update(
        &self,
        info: &CommitInfo,
        build: impl Fn(Option<TreeRef>) -> StoreResult<Hash>,
    ) -> StoreResult<Hash> {
        loop {
            let head = self.repo.head(&self.branch)?;
            let root = self.repo.root_of_head(head.as_ref())?;
            let tree = build(root)?;
            let commit = Commit::new(info.clone(), head.iter().copied().collect(), tree);
            let new_head = self.repo.add_commit(&commit)?;
            if self
                .repo
                .branches()
                .test_and_set(&self.branch, head.as_ref(), Some(&new_head))?
            {
                return Ok(new_head);
            }
            // Lost the race: another writer advanced the head. Rebuild
            // against the new head and try again.
        }
    }
}

impl std::fmt::Debug for BranchView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchView")
            .field("branch", &self.branch)
            .finish()
    }
}
