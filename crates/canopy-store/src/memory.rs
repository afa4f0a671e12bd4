//! In-memory store implementations for tests and embedding.
//!
//! All data lives in `HashMap`s behind `RwLock`s and is lost when the store
//! is dropped. Objects are cloned on read/write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use canopy_types::Hash;

use crate::error::{StoreError, StoreResult};
use crate::names::validate_branch_name;
use crate::object::StoredObject;
use crate::traits::{BranchEvent, BranchStore, ObjectStore, WatchCallback, WatchId};

/// In-memory, HashMap-based content-addressed object store.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Hash, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn mem(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(hash))
    }

    fn find(&self, hash: &Hash) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(hash).cloned())
    }

    fn add(&self, object: &StoredObject) -> StoreResult<Hash> {
        let hash = object.compute_hash();
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        // Idempotent: content-addressing guarantees the same hash always maps
        // to the same bytes.
        map.entry(hash).or_insert_with(|| object.clone());
        Ok(hash)
    }

    fn unsafe_add(&self, hash: &Hash, object: &StoredObject) -> StoreResult<()> {
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        map.entry(*hash).or_insert_with(|| object.clone());
        Ok(())
    }

    fn index(&self, hash: &Hash) -> StoreResult<Option<Hash>> {
        // Key and hash coincide in a content-addressed backend.
        Ok(if self.mem(hash)? { Some(*hash) } else { None })
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

struct Watcher {
    /// When set, only events for this branch are delivered.
    filter: Option<String>,
    callback: WatchCallback,
}

/// In-memory branch registry with watcher support.
pub struct InMemoryBranchStore {
    branches: RwLock<HashMap<String, Hash>>,
    watchers: RwLock<HashMap<WatchId, Watcher>>,
    next_watch: AtomicU64,
}

impl InMemoryBranchStore {
    /// Create a new empty branch store.
    pub fn new() -> Self {
        Self {
            branches: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
            next_watch: AtomicU64::new(1),
        }
    }

    /// Number of installed watchers (for tests and diagnostics).
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().map(|m| m.len()).unwrap_or(0)
    }

    fn notify(&self, event: &BranchEvent) -> StoreResult<()> {
        let watchers = self.watchers.read().map_err(|_| StoreError::LockPoisoned)?;
        for watcher in watchers.values() {
            match &watcher.filter {
                Some(branch) if branch != event.branch() => continue,
                _ => (watcher.callback)(event),
            }
        }
        Ok(())
    }

    fn install(&self, filter: Option<String>, callback: WatchCallback) -> StoreResult<WatchId> {
        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        let mut watchers = self.watchers.write().map_err(|_| StoreError::LockPoisoned)?;
        watchers.insert(id, Watcher { filter, callback });
        Ok(id)
    }
}

impl Default for InMemoryBranchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchStore for InMemoryBranchStore {
    fn mem(&self, branch: &str) -> StoreResult<bool> {
        let map = self.branches.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(branch))
    }

    fn find(&self, branch: &str) -> StoreResult<Option<Hash>> {
        let map = self.branches.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(branch).copied())
    }

    fn set(&self, branch: &str, head: Hash) -> StoreResult<()> {
        validate_branch_name(branch)?;
        {
            let mut map = self.branches.write().map_err(|_| StoreError::LockPoisoned)?;
            map.insert(branch.to_string(), head);
        }
        self.notify(&BranchEvent::Updated {
            branch: branch.to_string(),
            head,
        })
    }

    fn test_and_set(
        &self,
        branch: &str,
        test: Option<&Hash>,
        set: Option<&Hash>,
    ) -> StoreResult<bool> {
        validate_branch_name(branch)?;
        let applied = {
            let mut map = self.branches.write().map_err(|_| StoreError::LockPoisoned)?;
            let current = map.get(branch).copied();
            if current.as_ref() != test {
                false
            } else {
                match set {
                    Some(head) => {
                        map.insert(branch.to_string(), *head);
                    }
                    None => {
                        map.remove(branch);
                    }
                }
                true
            }
        };
        if applied {
            let event = match set {
                Some(head) => BranchEvent::Updated {
                    branch: branch.to_string(),
                    head: *head,
                },
                None => BranchEvent::Removed {
                    branch: branch.to_string(),
                },
            };
            self.notify(&event)?;
        }
        Ok(applied)
    }

    fn remove(&self, branch: &str) -> StoreResult<bool> {
        let removed = {
            let mut map = self.branches.write().map_err(|_| StoreError::LockPoisoned)?;
            map.remove(branch).is_some()
        };
        if removed {
            self.notify(&BranchEvent::Removed {
                branch: branch.to_string(),
            })?;
        }
        Ok(removed)
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let map = self.branches.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn clear(&self) -> StoreResult<()> {
        let drained: Vec<String> = {
            let mut map = self.branches.write().map_err(|_| StoreError::LockPoisoned)?;
            map.drain().map(|(name, _)| name).collect()
        };
        for branch in drained {
            self.notify(&BranchEvent::Removed { branch })?;
        }
        Ok(())
    }

    fn watch(&self, callback: WatchCallback) -> StoreResult<WatchId> {
        self.install(None, callback)
    }

    fn watch_key(&self, branch: &str, callback: WatchCallback) -> StoreResult<WatchId> {
        validate_branch_name(branch)?;
        self.install(Some(branch.to_string()), callback)
    }

    fn unwatch(&self, id: WatchId) -> StoreResult<bool> {
        let mut watchers = self.watchers.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(watchers.remove(&id).is_some())
    }
}

impl std::fmt::Debug for InMemoryBranchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.branches.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryBranchStore")
            .field("branch_count", &count)
            .finish()
    }
}
