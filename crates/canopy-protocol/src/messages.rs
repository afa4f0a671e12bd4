//! Command names and the typed request/response payloads they carry.
//!
//! Names are stable lowercase identifiers and form part of the wire
//! protocol. Store operations use bare names; tree operations and backend
//! passthroughs are dot-namespaced.

use canopy_store::{Contents, LocalTree, TreeRef};
use canopy_types::{CommitInfo, Hash, Path};
use serde::{Deserialize, Serialize};

/// The command-name table.
pub mod names {
    // Connectivity.
    pub const PING: &str = "ping";

    // Branch.
    pub const SET_CURRENT_BRANCH: &str = "set_current_branch";
    pub const GET_CURRENT_BRANCH: &str = "get_current_branch";
    pub const HEAD: &str = "head";
    pub const SET_HEAD: &str = "set_head";
    pub const REMOVE_BRANCH: &str = "remove_branch";

    // Store, on the session's current branch.
    pub const FIND: &str = "find";
    pub const MEM: &str = "mem";
    pub const MEM_TREE: &str = "mem_tree";
    pub const FIND_TREE: &str = "find_tree";
    pub const SET: &str = "set";
    pub const SET_TREE: &str = "set_tree";
    pub const REMOVE: &str = "remove";
    pub const TEST_AND_SET: &str = "test_and_set";
    pub const TEST_AND_SET_TREE: &str = "test_and_set_tree";

    // Server-resident trees.
    pub const TREE_EMPTY: &str = "tree.empty";
    pub const TREE_ADD: &str = "tree.add";
    pub const TREE_ADD_TREE: &str = "tree.add_tree";
    pub const TREE_REMOVE: &str = "tree.remove";
    pub const TREE_BATCH: &str = "tree.batch";
    pub const TREE_FIND: &str = "tree.find";
    pub const TREE_MEM: &str = "tree.mem";
    pub const TREE_MEM_TREE: &str = "tree.mem_tree";
    pub const TREE_LIST: &str = "tree.list";
    pub const TREE_HASH: &str = "tree.hash";
    pub const TREE_KEY: &str = "tree.key";
    pub const TREE_TO_LOCAL: &str = "tree.to_local";
    pub const TREE_OF_PATH: &str = "tree.of_path";
    pub const TREE_OF_HASH: &str = "tree.of_hash";
    pub const TREE_OF_COMMIT: &str = "tree.of_commit";
    pub const TREE_SAVE: &str = "tree.save";
    pub const TREE_MERGE: &str = "tree.merge";
    pub const TREE_CLEANUP: &str = "tree.cleanup";
    pub const TREE_CLEANUP_ALL: &str = "tree.cleanup_all";

    // Repository.
    pub const EXPORT: &str = "export";
    pub const IMPORT: &str = "import";
    pub const NEW_COMMIT: &str = "new_commit";

    // Backend passthrough: object stores.
    pub const CONTENTS_MEM: &str = "contents.mem";
    pub const CONTENTS_FIND: &str = "contents.find";
    pub const CONTENTS_ADD: &str = "contents.add";
    pub const CONTENTS_UNSAFE_ADD: &str = "contents.unsafe_add";
    pub const CONTENTS_INDEX: &str = "contents.index";
    pub const CONTENTS_MERGE: &str = "contents.merge";
    pub const NODE_MEM: &str = "node.mem";
    pub const NODE_FIND: &str = "node.find";
    pub const NODE_ADD: &str = "node.add";
    pub const NODE_UNSAFE_ADD: &str = "node.unsafe_add";
    pub const NODE_INDEX: &str = "node.index";
    pub const NODE_MERGE: &str = "node.merge";
    pub const COMMIT_MEM: &str = "commit.mem";
    pub const COMMIT_FIND: &str = "commit.find";
    pub const COMMIT_ADD: &str = "commit.add";
    pub const COMMIT_UNSAFE_ADD: &str = "commit.unsafe_add";
    pub const COMMIT_INDEX: &str = "commit.index";
    pub const COMMIT_MERGE: &str = "commit.merge";

    // Backend passthrough: branch registry.
    pub const BRANCH_MEM: &str = "branch.mem";
    pub const BRANCH_FIND: &str = "branch.find";
    pub const BRANCH_SET: &str = "branch.set";
    pub const BRANCH_TEST_AND_SET: &str = "branch.test_and_set";
    pub const BRANCH_REMOVE: &str = "branch.remove";
    pub const BRANCH_LIST: &str = "branch.list";
    pub const BRANCH_CLEAR: &str = "branch.clear";
    pub const BRANCH_WATCH: &str = "branch.watch";
    pub const BRANCH_WATCH_KEY: &str = "branch.watch_key";
    pub const BRANCH_UNWATCH: &str = "branch.unwatch";
}

/// A tree argument on the wire: a session-scoped handle, a stored key, or
/// a concrete local tree.
///
/// Clients must never manufacture handle identifiers, only echo ones the
/// server handed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeSpec {
    Handle(u64),
    Key(TreeRef),
    Local(LocalTree),
}

/// `set`: bind contents at a path on the current branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetArgs {
    pub path: Path,
    pub info: CommitInfo,
    pub contents: Contents,
}

/// `set_tree`: graft a tree at a path on the current branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTreeArgs {
    pub path: Path,
    pub info: CommitInfo,
    pub tree: TreeSpec,
}

/// `remove`: unbind a path on the current branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveArgs {
    pub path: Path,
    pub info: CommitInfo,
}

/// `test_and_set`: compare-and-swap contents at a path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAndSetArgs {
    pub path: Path,
    pub info: CommitInfo,
    pub test: Option<Contents>,
    pub set: Option<Contents>,
}

/// `test_and_set_tree`: compare-and-swap the tree at a path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAndSetTreeArgs {
    pub path: Path,
    pub info: CommitInfo,
    pub test: Option<TreeSpec>,
    pub set: Option<TreeSpec>,
}

/// `head` / arguments defaulting to the session branch when omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadArgs {
    pub branch: Option<String>,
}

/// `set_head`: atomically point a branch at a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHeadArgs {
    pub branch: Option<String>,
    pub commit: Hash,
}

/// Tree read operations: a tree plus a path into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePathArgs {
    pub tree: TreeSpec,
    pub path: Path,
}

/// `tree.add`: bind contents inside a server-resident tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAddArgs {
    pub tree: TreeSpec,
    pub path: Path,
    pub contents: Contents,
}

/// `tree.add_tree`: graft one tree into another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeGraftArgs {
    pub tree: TreeSpec,
    pub path: Path,
    pub other: TreeSpec,
}

/// One step of a `tree.batch` application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Add { path: Path, contents: Contents },
    AddTree { path: Path, tree: TreeSpec },
    Remove { path: Path },
}

/// `tree.batch`: apply a sequence of operations, producing one new tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeBatchArgs {
    pub tree: TreeSpec,
    pub ops: Vec<BatchOp>,
}

/// `tree.merge`: three-way merge of server-resident trees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMergeArgs {
    pub base: Option<TreeSpec>,
    pub ours: TreeSpec,
    pub theirs: TreeSpec,
}

/// The kind of a listed tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Contents,
    Node,
}

impl From<&TreeRef> for EntryKind {
    fn from(tree: &TreeRef) -> Self {
        match tree {
            TreeRef::Contents(_) => Self::Contents,
            TreeRef::Node(_) => Self::Node,
        }
    }
}

/// One entry of a `tree.list` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub step: String,
    pub kind: EntryKind,
}

/// `new_commit`: write a commit referencing an existing tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommitArgs {
    pub info: CommitInfo,
    pub parents: Vec<Hash>,
    pub tree: Hash,
}

/// `export`: optional bound on commit-ancestry depth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArgs {
    pub depth: Option<u32>,
}

/// `*.unsafe_add`: a caller-verified hash plus the value for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedValue<T> {
    pub hash: Hash,
    pub value: T,
}

/// `*.merge`: optional keys for ancestor and both sides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeKeysArgs {
    pub base: Option<Hash>,
    pub ours: Option<Hash>,
    pub theirs: Option<Hash>,
}

/// `branch.set`: point a branch at a commit key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSetArgs {
    pub branch: String,
    pub head: Hash,
}

/// `branch.test_and_set`: atomic compare-and-swap on the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCasArgs {
    pub branch: String,
    pub test: Option<Hash>,
    pub set: Option<Hash>,
}
