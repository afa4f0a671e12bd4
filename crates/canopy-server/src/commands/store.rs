//! Store operations on the session's current branch.
//!
//! Mutations run the optimistic commit loop in [`canopy_store::BranchView`]
//! and answer with the key of the commit they produced. The compare-and-
//! swap pair answers `false` instead of retrying.

use async_trait::async_trait;
use canopy_protocol::messages::{
    names, RemoveArgs, SetArgs, SetTreeArgs, TestAndSetArgs, TestAndSetTreeArgs,
};
use canopy_store::Contents;
use canopy_types::{Hash, Path};

use crate::commands::{resolve_spec, stash};
use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

/// `find`: contents at a path on the current branch.
pub struct Find;

#[async_trait]
impl Command for Find {
    const NAME: &'static str = names::FIND;
    type Req = Path;
    type Res = Option<Contents>;

    async fn run(ctx: &mut SessionCtx<'_>, path: Path) -> ServerResult<Option<Contents>> {
        Ok(ctx.session.view().find(&path)?)
    }
}

/// `mem`: whether contents are bound at a path.
pub struct Mem;

#[async_trait]
impl Command for Mem {
    const NAME: &'static str = names::MEM;
    type Req = Path;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, path: Path) -> ServerResult<bool> {
        Ok(ctx.session.view().mem(&path)?)
    }
}

/// `mem_tree`: whether anything is bound at a path.
pub struct MemTree;

#[async_trait]
impl Command for MemTree {
    const NAME: &'static str = names::MEM_TREE;
    type Req = Path;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, path: Path) -> ServerResult<bool> {
        Ok(ctx.session.view().mem_tree(&path)?)
    }
}

/// `find_tree`: the subtree at a path, as a fresh handle.
pub struct FindTree;

#[async_trait]
impl Command for FindTree {
    const NAME: &'static str = names::FIND_TREE;
    type Req = Path;
    type Res = Option<u64>;

    async fn run(ctx: &mut SessionCtx<'_>, path: Path) -> ServerResult<Option<u64>> {
        match ctx.session.view().find_tree(&path)? {
            Some(tree) => Ok(Some(stash(ctx, tree))),
            None => Ok(None),
        }
    }
}

/// `set`: bind contents, producing a commit.
pub struct Set;

#[async_trait]
impl Command for Set {
    const NAME: &'static str = names::SET;
    type Req = SetArgs;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, req: SetArgs) -> ServerResult<Hash> {
        Ok(ctx.session.view().set(&req.path, &req.info, &req.contents)?)
    }
}

/// `set_tree`: graft a tree, producing a commit.
pub struct SetTree;

#[async_trait]
impl Command for SetTree {
    const NAME: &'static str = names::SET_TREE;
    type Req = SetTreeArgs;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, req: SetTreeArgs) -> ServerResult<Hash> {
        let tree = resolve_spec(ctx, &req.tree)?;
        Ok(ctx.session.view().set_tree(&req.path, &req.info, &tree)?)
    }
}

/// `remove`: unbind a path, producing a commit.
pub struct Remove;

#[async_trait]
impl Command for Remove {
    const NAME: &'static str = names::REMOVE;
    type Req = RemoveArgs;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, req: RemoveArgs) -> ServerResult<Hash> {
        Ok(ctx.session.view().remove(&req.path, &req.info)?)
    }
}

/// `test_and_set`: compare-and-swap contents; `false` on disagreement.
pub struct TestAndSet;

#[async_trait]
impl Command for TestAndSet {
    const NAME: &'static str = names::TEST_AND_SET;
    type Req = TestAndSetArgs;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, req: TestAndSetArgs) -> ServerResult<bool> {
        Ok(ctx.session.view().test_and_set(
            &req.path,
            &req.info,
            req.test.as_ref(),
            req.set.as_ref(),
        )?)
    }
}

/// `test_and_set_tree`: compare-and-swap the tree at a path.
pub struct TestAndSetTree;

#[async_trait]
impl Command for TestAndSetTree {
    const NAME: &'static str = names::TEST_AND_SET_TREE;
    type Req = TestAndSetTreeArgs;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, req: TestAndSetTreeArgs) -> ServerResult<bool> {
        let test = match &req.test {
            Some(spec) => Some(resolve_spec(ctx, spec)?),
            None => None,
        };
        let set = match &req.set {
            Some(spec) => Some(resolve_spec(ctx, spec)?),
            None => None,
        };
        Ok(ctx.session.view().test_and_set_tree(
            &req.path,
            &req.info,
            test.as_ref(),
            set.as_ref(),
        )?)
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<Find>();
    registry.register::<Mem>();
    registry.register::<MemTree>();
    registry.register::<FindTree>();
    registry.register::<Set>();
    registry.register::<SetTree>();
    registry.register::<Remove>();
    registry.register::<TestAndSet>();
    registry.register::<TestAndSetTree>();
}
