//! Server-resident tree manipulation.
//!
//! Tree-producing commands allocate a fresh handle for the result; the
//! source handle stays valid until released. Read-only commands answer in
//! place.

use async_trait::async_trait;
use canopy_protocol::messages::{
    names, BatchOp, ListEntry, TreeAddArgs, TreeBatchArgs, TreeGraftArgs, TreeMergeArgs,
    TreePathArgs, TreeSpec,
};
use canopy_store::{Contents, LocalTree, TreeRef};
use canopy_types::{Hash, Path};

use crate::commands::{resolve_spec, stash};
use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

/// `tree.empty`: a handle to the empty tree.
pub struct TreeEmpty;

#[async_trait]
impl Command for TreeEmpty {
    const NAME: &'static str = names::TREE_EMPTY;
    type Req = ();
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<u64> {
        let tree = ctx.repo.empty_tree()?;
        Ok(stash(ctx, tree))
    }
}

/// `tree.add`: bind contents, returning a handle to the new tree.
pub struct TreeAdd;

#[async_trait]
impl Command for TreeAdd {
    const NAME: &'static str = names::TREE_ADD;
    type Req = TreeAddArgs;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeAddArgs) -> ServerResult<u64> {
        let at = resolve_spec(ctx, &req.tree)?;
        let tree = ctx.repo.tree_add(&at, &req.path, &req.contents)?;
        Ok(stash(ctx, tree))
    }
}

/// `tree.add_tree`: graft one tree into another.
pub struct TreeAddTree;

#[async_trait]
impl Command for TreeAddTree {
    const NAME: &'static str = names::TREE_ADD_TREE;
    type Req = TreeGraftArgs;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeGraftArgs) -> ServerResult<u64> {
        let at = resolve_spec(ctx, &req.tree)?;
        let other = resolve_spec(ctx, &req.other)?;
        let tree = ctx.repo.tree_add_tree(&at, &req.path, &other)?;
        Ok(stash(ctx, tree))
    }
}

/// `tree.remove`: unbind a path, returning a handle to the new tree.
pub struct TreeRemove;

#[async_trait]
impl Command for TreeRemove {
    const NAME: &'static str = names::TREE_REMOVE;
    type Req = TreePathArgs;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreePathArgs) -> ServerResult<u64> {
        let at = resolve_spec(ctx, &req.tree)?;
        let tree = ctx.repo.tree_remove(&at, &req.path)?;
        Ok(stash(ctx, tree))
    }
}

/// `tree.batch`: apply a sequence of operations in one round-trip.
pub struct TreeBatch;

#[async_trait]
impl Command for TreeBatch {
    const NAME: &'static str = names::TREE_BATCH;
    type Req = TreeBatchArgs;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeBatchArgs) -> ServerResult<u64> {
        let mut tree = resolve_spec(ctx, &req.tree)?;
        for op in &req.ops {
            tree = match op {
                BatchOp::Add { path, contents } => ctx.repo.tree_add(&tree, path, contents)?,
                BatchOp::AddTree { path, tree: other } => {
                    let other = resolve_spec(ctx, other)?;
                    ctx.repo.tree_add_tree(&tree, path, &other)?
                }
                BatchOp::Remove { path } => ctx.repo.tree_remove(&tree, path)?,
            };
        }
        Ok(stash(ctx, tree))
    }
}

/// `tree.find`: contents at a path inside a tree.
pub struct TreeFind;

#[async_trait]
impl Command for TreeFind {
    const NAME: &'static str = names::TREE_FIND;
    type Req = TreePathArgs;
    type Res = Option<Contents>;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreePathArgs) -> ServerResult<Option<Contents>> {
        let at = resolve_spec(ctx, &req.tree)?;
        Ok(ctx.repo.tree_find(&at, &req.path)?)
    }
}

/// `tree.mem`: whether contents are bound at a path.
pub struct TreeMem;

#[async_trait]
impl Command for TreeMem {
    const NAME: &'static str = names::TREE_MEM;
    type Req = TreePathArgs;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreePathArgs) -> ServerResult<bool> {
        let at = resolve_spec(ctx, &req.tree)?;
        Ok(ctx.repo.tree_mem(&at, &req.path)?)
    }
}

/// `tree.mem_tree`: whether anything is bound at a path.
pub struct TreeMemTree;

#[async_trait]
impl Command for TreeMemTree {
    const NAME: &'static str = names::TREE_MEM_TREE;
    type Req = TreePathArgs;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreePathArgs) -> ServerResult<bool> {
        let at = resolve_spec(ctx, &req.tree)?;
        Ok(ctx.repo.tree_mem_tree(&at, &req.path)?)
    }
}

/// `tree.list`: the steps and kinds under a path.
pub struct TreeList;

#[async_trait]
impl Command for TreeList {
    const NAME: &'static str = names::TREE_LIST;
    type Req = TreePathArgs;
    type Res = Vec<ListEntry>;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreePathArgs) -> ServerResult<Vec<ListEntry>> {
        let at = resolve_spec(ctx, &req.tree)?;
        let entries = ctx.repo.tree_list(&at, &req.path)?;
        Ok(entries
            .into_iter()
            .map(|entry| ListEntry {
                kind: (&entry.target).into(),
                step: entry.step,
            })
            .collect())
    }
}

/// `tree.hash`: the content hash of a tree.
pub struct TreeHash;

#[async_trait]
impl Command for TreeHash {
    const NAME: &'static str = names::TREE_HASH;
    type Req = TreeSpec;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeSpec) -> ServerResult<Hash> {
        Ok(resolve_spec(ctx, &req)?.hash())
    }
}

/// `tree.key`: the kinded key of a tree.
pub struct TreeKey;

#[async_trait]
impl Command for TreeKey {
    const NAME: &'static str = names::TREE_KEY;
    type Req = TreeSpec;
    type Res = TreeRef;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeSpec) -> ServerResult<TreeRef> {
        Ok(resolve_spec(ctx, &req)?)
    }
}

/// `tree.to_local`: materialize a tree for the client.
pub struct TreeToLocal;

#[async_trait]
impl Command for TreeToLocal {
    const NAME: &'static str = names::TREE_TO_LOCAL;
    type Req = TreeSpec;
    type Res = LocalTree;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeSpec) -> ServerResult<LocalTree> {
        let tree = resolve_spec(ctx, &req)?;
        Ok(ctx.repo.to_local(&tree)?)
    }
}

/// `tree.of_path`: hydrate a handle from the current branch.
pub struct TreeOfPath;

#[async_trait]
impl Command for TreeOfPath {
    const NAME: &'static str = names::TREE_OF_PATH;
    type Req = Path;
    type Res = Option<u64>;

    async fn run(ctx: &mut SessionCtx<'_>, path: Path) -> ServerResult<Option<u64>> {
        match ctx.session.view().find_tree(&path)? {
            Some(tree) => Ok(Some(stash(ctx, tree))),
            None => Ok(None),
        }
    }
}

/// `tree.of_hash`: hydrate a handle from a bare hash.
pub struct TreeOfHash;

#[async_trait]
impl Command for TreeOfHash {
    const NAME: &'static str = names::TREE_OF_HASH;
    type Req = Hash;
    type Res = Option<u64>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<u64>> {
        match ctx.repo.tree_of_hash(&hash)? {
            Some(tree) => Ok(Some(stash(ctx, tree))),
            None => Ok(None),
        }
    }
}

/// `tree.of_commit`: hydrate a handle from a commit's root tree.
pub struct TreeOfCommit;

#[async_trait]
impl Command for TreeOfCommit {
    const NAME: &'static str = names::TREE_OF_COMMIT;
    type Req = Hash;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<u64> {
        let tree = ctx.repo.tree_of_commit(&hash)?;
        Ok(stash(ctx, tree))
    }
}

/// `tree.save`: persist a tree, answering its contents- or node-key.
pub struct TreeSave;

#[async_trait]
impl Command for TreeSave {
    const NAME: &'static str = names::TREE_SAVE;
    type Req = TreeSpec;
    type Res = TreeRef;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeSpec) -> ServerResult<TreeRef> {
        Ok(resolve_spec(ctx, &req)?)
    }
}

/// `tree.merge`: three-way merge; a conflict is a recoverable error.
pub struct TreeMerge;

#[async_trait]
impl Command for TreeMerge {
    const NAME: &'static str = names::TREE_MERGE;
    type Req = TreeMergeArgs;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, req: TreeMergeArgs) -> ServerResult<u64> {
        let base = match &req.base {
            Some(spec) => Some(resolve_spec(ctx, spec)?),
            None => None,
        };
        let ours = resolve_spec(ctx, &req.ours)?;
        let theirs = resolve_spec(ctx, &req.theirs)?;
        let merged = ctx.repo.merge_trees(base.as_ref(), &ours, &theirs)?;
        Ok(stash(ctx, merged))
    }
}

/// `tree.cleanup`: release one handle.
pub struct TreeCleanup;

#[async_trait]
impl Command for TreeCleanup {
    const NAME: &'static str = names::TREE_CLEANUP;
    type Req = u64;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, id: u64) -> ServerResult<bool> {
        Ok(ctx.session.trees.remove(id))
    }
}

/// `tree.cleanup_all`: release every handle of the session.
pub struct TreeCleanupAll;

#[async_trait]
impl Command for TreeCleanupAll {
    const NAME: &'static str = names::TREE_CLEANUP_ALL;
    type Req = ();
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<()> {
        ctx.session.trees.clear();
        Ok(())
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<TreeEmpty>();
    registry.register::<TreeAdd>();
    registry.register::<TreeAddTree>();
    registry.register::<TreeRemove>();
    registry.register::<TreeBatch>();
    registry.register::<TreeFind>();
    registry.register::<TreeMem>();
    registry.register::<TreeMemTree>();
    registry.register::<TreeList>();
    registry.register::<TreeHash>();
    registry.register::<TreeKey>();
    registry.register::<TreeToLocal>();
    registry.register::<TreeOfPath>();
    registry.register::<TreeOfHash>();
    registry.register::<TreeOfCommit>();
    registry.register::<TreeSave>();
    registry.register::<TreeMerge>();
    registry.register::<TreeCleanup>();
    registry.register::<TreeCleanupAll>();
}
