use canopy_types::Hash;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - The store is append-only: objects are immutable once written and the
///   same data always produces the same key.
/// - `add` computes and verifies the hash; `unsafe_add` trusts the caller's
///   hash and must only be used when the caller has already verified it.
/// - Concurrent reads are always safe.
/// - The store never interprets object bytes.
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists in the store.
    fn mem(&self, hash: &Hash) -> StoreResult<bool>;

    /// Read an object by its content-addressed hash.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn find(&self, hash: &Hash) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed key.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn add(&self, object: &StoredObject) -> StoreResult<Hash>;

    /// Write an object at a caller-supplied hash without re-hashing.
    fn unsafe_add(&self, hash: &Hash, object: &StoredObject) -> StoreResult<()>;

    /// Resolve a hash to the store's key for it, if present.
    ///
    /// For content-addressed backends the key is the hash itself; layered
    /// backends may distinguish the two.
    fn index(&self, hash: &Hash) -> StoreResult<Option<Hash>>;
}

/// Identifier for an installed branch watcher.
pub type WatchId = u64;

/// A change observed on the branch registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchEvent {
    /// The branch now points at `head`.
    Updated { branch: String, head: Hash },
    /// The branch mapping was removed.
    Removed { branch: String },
}

impl BranchEvent {
    /// The branch this event concerns.
    pub fn branch(&self) -> &str {
        match self {
            Self::Updated { branch, .. } | Self::Removed { branch } => branch,
        }
    }
}

/// Callback invoked synchronously for each branch change.
pub type WatchCallback = Box<dyn Fn(&BranchEvent) + Send + Sync>;

/// Registry of named branches, each mapping to at most one commit key.
///
/// Updates are atomic: `test_and_set` compares and swaps under one critical
/// section, and watchers observe every successful mutation.
pub trait BranchStore: Send + Sync {
    /// Check whether a branch exists.
    fn mem(&self, branch: &str) -> StoreResult<bool>;

    /// The commit key a branch points at, if any.
    fn find(&self, branch: &str) -> StoreResult<Option<Hash>>;

    /// Point a branch at a commit key, creating it if needed.
    fn set(&self, branch: &str, head: Hash) -> StoreResult<()>;

    /// Atomically update a branch if it currently points at `test`
    /// (`None` meaning "absent"). `set: None` removes the mapping.
    ///
    /// Returns `false` (and changes nothing) if the observed value differs.
    fn test_and_set(
        &self,
        branch: &str,
        test: Option<&Hash>,
        set: Option<&Hash>,
    ) -> StoreResult<bool>;

    /// Remove a branch. Returns `true` if it existed.
    fn remove(&self, branch: &str) -> StoreResult<bool>;

    /// All branch names, sorted.
    fn list(&self) -> StoreResult<Vec<String>>;

    /// Remove every branch.
    fn clear(&self) -> StoreResult<()>;

    /// Install a watcher over all branches.
    fn watch(&self, callback: WatchCallback) -> StoreResult<WatchId>;

    /// Install a watcher over a single branch.
    fn watch_key(&self, branch: &str, callback: WatchCallback) -> StoreResult<WatchId>;

    /// Remove a watcher. Returns `true` if it was installed.
    fn unwatch(&self, id: WatchId) -> StoreResult<bool>;
}
