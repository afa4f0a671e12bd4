use canopy_types::{Hash, TypeError};
use thiserror::Error;

use crate::object::ObjectKind;

/// Errors that can occur in the object stores and branch registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced object is missing from its store.
    #[error("{kind} object not found: {hash}")]
    NotFound { kind: ObjectKind, hash: Hash },

    /// An object's bytes do not decode as the expected kind.
    #[error("corrupt {kind} object {hash}: {reason}")]
    CorruptObject {
        kind: ObjectKind,
        hash: Hash,
        reason: String,
    },

    /// A commit referenced a parent that does not resolve.
    #[error("unknown parent commit: {0}")]
    UnknownParent(Hash),

    /// The branch name does not satisfy the naming rules.
    #[error("invalid branch name {name:?}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// Three-way merge found irreconcilable values.
    #[error("merge conflict at {path:?}")]
    MergeConflict { path: String },

    /// The operation addressed a path the tree shape cannot satisfy.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
