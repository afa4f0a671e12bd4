use canopy_types::{CommitInfo, Hash};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Opaque user payload.
    Contents,
    /// Tree node: sorted entries mapping steps to kinded keys.
    Node,
    /// Commit: info, parents, root tree.
    Commit,
}

impl ObjectKind {
    /// The key-derivation context under which objects of this kind are
    /// hashed. One context per kind keeps keys from colliding across
    /// kinds even over identical bytes.
    pub fn hash_context(&self) -> &'static str {
        match self {
            Self::Contents => "canopy 2024 object contents",
            Self::Node => "canopy 2024 object node",
            Self::Commit => "canopy 2024 object commit",
        }
    }

    /// Hash `data` as an object of this kind.
    pub fn hash_of(&self, data: &[u8]) -> Hash {
        Hash::derive(self.hash_context(), data)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contents => write!(f, "contents"),
            Self::Node => write!(f, "node"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag + encoded bytes + cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// bytes; it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The kind of this object.
    pub kind: ObjectKind,
    /// The encoded bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and encoded bytes.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed hash for this object, under the
    /// kind's derivation context.
    pub fn compute_hash(&self) -> Hash {
        self.kind.hash_of(&self.data)
    }
}

/// A kinded key: a hash known to name either contents or a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeRef {
    Contents(Hash),
    Node(Hash),
}

impl TreeRef {
    /// The hash regardless of kind.
    pub fn hash(&self) -> Hash {
        match self {
            Self::Contents(h) | Self::Node(h) => *h,
        }
    }

    /// The object kind this key points at.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Contents(_) => ObjectKind::Contents,
            Self::Node(_) => ObjectKind::Node,
        }
    }

    /// Returns `true` if this key names a node.
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }
}

// ---------------------------------------------------------------------------
// Contents
// ---------------------------------------------------------------------------

/// Opaque user payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contents(pub Vec<u8>);

impl Contents {
    /// Create contents from raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The content-addressed hash of these contents.
    pub fn hash(&self) -> Hash {
        self.to_stored_object().compute_hash()
    }

    /// Convert into a `StoredObject` for storage. Contents bytes are stored
    /// verbatim, no envelope.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Contents, self.0.clone())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Contents {
            return Err(StoreError::CorruptObject {
                kind: ObjectKind::Contents,
                hash: obj.compute_hash(),
                reason: format!("expected contents, got {}", obj.kind),
            });
        }
        Ok(Self(obj.data.clone()))
    }
}

impl From<&str> for Contents {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single entry in a tree node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Step name within the parent node.
    pub step: String,
    /// Kinded key of the referenced object.
    pub target: TreeRef,
}

impl NodeEntry {
    pub fn new(step: impl Into<String>, target: TreeRef) -> Self {
        Self {
            step: step.into(),
            target,
        }
    }
}

impl PartialOrd for NodeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.step.cmp(&other.step)
    }
}

/// A tree node: steps mapped to kinded keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Entries sorted by step for deterministic hashing.
    pub entries: Vec<NodeEntry>,
}

impl Node {
    /// Create a node with the given entries. Entries are sorted by step.
    pub fn new(mut entries: Vec<NodeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty node.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up an entry by step.
    pub fn get(&self, step: &str) -> Option<&NodeEntry> {
        self.entries.iter().find(|e| e.step == step)
    }

    /// A new node with `step` bound to `target` (replacing any existing
    /// binding).
    pub fn with_entry(&self, step: impl Into<String>, target: TreeRef) -> Self {
        let step = step.into();
        let mut entries: Vec<NodeEntry> =
            self.entries.iter().filter(|e| e.step != step).cloned().collect();
        entries.push(NodeEntry::new(step, target));
        Self::new(entries)
    }

    /// A new node without any binding for `step`.
    pub fn without_entry(&self, step: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.step != step)
                .cloned()
                .collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the node has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The content-addressed hash of this node.
    pub fn hash(&self) -> StoreResult<Hash> {
        Ok(self.to_stored_object()?.compute_hash())
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Node, data))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Node {
            return Err(StoreError::CorruptObject {
                kind: ObjectKind::Node,
                hash: obj.compute_hash(),
                reason: format!("expected node, got {}", obj.kind),
            });
        }
        bincode::deserialize(&obj.data).map_err(|e| StoreError::CorruptObject {
            kind: ObjectKind::Node,
            hash: obj.compute_hash(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// An immutable commit: metadata, parent commits, root tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Author, message, timestamp.
    pub info: CommitInfo,
    /// Keys of parent commits. Must resolve at commit time.
    pub parents: Vec<Hash>,
    /// Key of the root tree node.
    pub tree: Hash,
}

impl Commit {
    pub fn new(info: CommitInfo, parents: Vec<Hash>, tree: Hash) -> Self {
        Self {
            info,
            parents,
            tree,
        }
    }

    /// The content-addressed hash of this commit.
    pub fn hash(&self) -> StoreResult<Hash> {
        Ok(self.to_stored_object()?.compute_hash())
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Commit {
            return Err(StoreError::CorruptObject {
                kind: ObjectKind::Commit,
                hash: obj.compute_hash(),
                reason: format!("expected commit, got {}", obj.kind),
            });
        }
        bincode::deserialize(&obj.data).map_err(|e| StoreError::CorruptObject {
            kind: ObjectKind::Commit,
            hash: obj.compute_hash(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_roundtrip() {
        let contents = Contents::new(b"hello world".to_vec());
        let stored = contents.to_stored_object();
        let decoded = Contents::from_stored_object(&stored).unwrap();
        assert_eq!(contents, decoded);
    }

    #[test]
    fn contents_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Node, b"not contents".to_vec());
        let err = Contents::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn node_entries_sorted() {
        let node = Node::new(vec![
            NodeEntry::new("zebra", TreeRef::Contents(Hash::ZERO)),
            NodeEntry::new("alpha", TreeRef::Contents(Hash::ZERO)),
            NodeEntry::new("middle", TreeRef::Node(Hash::ZERO)),
        ]);
        assert_eq!(node.entries[0].step, "alpha");
        assert_eq!(node.entries[1].step, "middle");
        assert_eq!(node.entries[2].step, "zebra");
    }

    #[test]
    fn node_roundtrip() {
        let node = Node::new(vec![
            NodeEntry::new("file", TreeRef::Contents(Hash::digest(b"c"))),
            NodeEntry::new("dir", TreeRef::Node(Hash::digest(b"n"))),
        ]);
        let stored = node.to_stored_object().unwrap();
        let decoded = Node::from_stored_object(&stored).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn node_with_entry_replaces() {
        let node = Node::new(vec![NodeEntry::new("a", TreeRef::Contents(Hash::ZERO))]);
        let target = TreeRef::Contents(Hash::digest(b"new"));
        let updated = node.with_entry("a", target);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.get("a").unwrap().target, target);
    }

    #[test]
    fn node_without_entry() {
        let node = Node::new(vec![
            NodeEntry::new("a", TreeRef::Contents(Hash::ZERO)),
            NodeEntry::new("b", TreeRef::Contents(Hash::ZERO)),
        ]);
        let updated = node.without_entry("a");
        assert_eq!(updated.len(), 1);
        assert!(updated.get("a").is_none());
        assert!(updated.get("b").is_some());
    }

    #[test]
    fn empty_node() {
        let node = Node::empty();
        assert!(node.is_empty());
        assert_eq!(node.len(), 0);
    }

    #[test]
    fn node_hash_ignores_insertion_order() {
        let a = Node::new(vec![
            NodeEntry::new("x", TreeRef::Contents(Hash::digest(b"1"))),
            NodeEntry::new("y", TreeRef::Contents(Hash::digest(b"2"))),
        ]);
        let b = Node::new(vec![
            NodeEntry::new("y", TreeRef::Contents(Hash::digest(b"2"))),
            NodeEntry::new("x", TreeRef::Contents(Hash::digest(b"1"))),
        ]);
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn commit_roundtrip() {
        let commit = Commit::new(
            canopy_types::CommitInfo::at("alice", "msg", 1),
            vec![Hash::digest(b"parent")],
            Hash::digest(b"tree"),
        );
        let stored = commit.to_stored_object().unwrap();
        let decoded = Commit::from_stored_object(&stored).unwrap();
        assert_eq!(commit, decoded);
    }

    #[test]
    fn stored_hash_deterministic() {
        let obj = StoredObject::new(ObjectKind::Contents, b"deterministic".to_vec());
        assert_eq!(obj.compute_hash(), obj.compute_hash());
    }

    #[test]
    fn different_kinds_produce_different_hashes() {
        let data = b"same data".to_vec();
        let c = StoredObject::new(ObjectKind::Contents, data.clone());
        let n = StoredObject::new(ObjectKind::Node, data.clone());
        let k = StoredObject::new(ObjectKind::Commit, data);
        assert_ne!(c.compute_hash(), n.compute_hash());
        assert_ne!(c.compute_hash(), k.compute_hash());
    }

    #[test]
    fn tree_ref_accessors() {
        let h = Hash::digest(b"x");
        assert_eq!(TreeRef::Contents(h).hash(), h);
        assert_eq!(TreeRef::Node(h).hash(), h);
        assert!(TreeRef::Node(h).is_node());
        assert!(!TreeRef::Contents(h).is_node());
        assert_eq!(TreeRef::Contents(h).kind(), ObjectKind::Contents);
    }

    #[test]
    fn object_kind_display() {
        assert_eq!(format!("{}", ObjectKind::Contents), "contents");
        assert_eq!(format!("{}", ObjectKind::Node), "node");
        assert_eq!(format!("{}", ObjectKind::Commit), "commit");
    }
}
