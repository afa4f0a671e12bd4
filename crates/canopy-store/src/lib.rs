//! Merkle store backend for Canopy.
//!
//! A repository is four object stores (contents, nodes, commits, and the
//! branch registry) plus the algebra over them: persistent tree updates,
//! three-way merge, bulk slices, and the optimistic commit loop.
//!
//! All object stores are append-only and content-addressed: adding a value
//! returns a key derived from its hash, and equal values share one key.

pub mod error;
pub mod memory;
pub mod merge;
pub mod names;
pub mod object;
pub mod repo;
pub mod slice;
pub mod traits;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBranchStore, InMemoryObjectStore};
pub use merge::MergeOutcome;
pub use names::{validate_branch_name, MAX_BRANCH_NAME_LEN};
pub use object::{Commit, Contents, Node, NodeEntry, ObjectKind, StoredObject, TreeRef};
pub use repo::{BranchView, Repo, RepoOptions};
pub use slice::{Slice, SliceObject};
pub use traits::{BranchEvent, BranchStore, ObjectStore, WatchCallback, WatchId};
pub use tree::{LocalTree, Tree};
