//! Bulk repository transfer and raw commit creation.

use async_trait::async_trait;
use canopy_protocol::messages::{names, ExportArgs, NewCommitArgs};
use canopy_store::Slice;
use canopy_types::Hash;

use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

/// `export`: a slice of the object graph, ancestry bounded by `depth`.
pub struct Export;

#[async_trait]
impl Command for Export {
    const NAME: &'static str = names::EXPORT;
    type Req = ExportArgs;
    type Res = Slice;

    async fn run(ctx: &mut SessionCtx<'_>, req: ExportArgs) -> ServerResult<Slice> {
        Ok(ctx.repo.export(req.depth)?)
    }
}

/// `import`: ingest a slice, answering the object count.
pub struct Import;

#[async_trait]
impl Command for Import {
    const NAME: &'static str = names::IMPORT;
    type Req = Slice;
    type Res = u64;

    async fn run(ctx: &mut SessionCtx<'_>, slice: Slice) -> ServerResult<u64> {
        Ok(ctx.repo.import(&slice)? as u64)
    }
}

/// `new_commit`: write a commit referencing an existing tree.
pub struct NewCommit;

#[async_trait]
impl Command for NewCommit {
    const NAME: &'static str = names::NEW_COMMIT;
    type Req = NewCommitArgs;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, req: NewCommitArgs) -> ServerResult<Hash> {
        Ok(ctx.repo.new_commit(req.info, req.parents, req.tree)?)
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<Export>();
    registry.register::<Import>();
    registry.register::<NewCommit>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Fixture;
    use canopy_store::Contents;
    use canopy_types::{CommitInfo, Path};

    fn info() -> CommitInfo {
        CommitInfo::at("test", "m", 0)
    }

    #[tokio::test]
    async fn export_then_import_into_fresh_repo() {
        let mut source = Fixture::new();
        source
            .session
            .view()
            .set(&Path::parse("a/b").unwrap(), &info(), &Contents::from("v"))
            .unwrap();
        let head = source.repo.head("main").unwrap().unwrap();

        let slice = Export::run(&mut source.ctx(), ExportArgs { depth: None })
            .await
            .unwrap();

        let mut target = Fixture::new();
        let count = Import::run(&mut target.ctx(), slice.clone()).await.unwrap();
        assert_eq!(count as usize, slice.len());

        target.repo.set_head("main", head).unwrap();
        assert_eq!(
            target
                .session
                .view()
                .find(&Path::parse("a/b").unwrap())
                .unwrap(),
            Some(Contents::from("v"))
        );
    }

    #[tokio::test]
    async fn new_commit_links_existing_objects() {
        let mut fx = Fixture::new();
        let parent = fx
            .session
            .view()
            .set(&Path::parse("k").unwrap(), &info(), &Contents::from("v"))
            .unwrap();
        let tree = fx.repo.commit_of(&parent).unwrap().unwrap().tree;

        let commit = NewCommit::run(
            &mut fx.ctx(),
            NewCommitArgs {
                info: info(),
                parents: vec![parent],
                tree,
            },
        )
        .await
        .unwrap();
        let stored = fx.repo.commit_of(&commit).unwrap().unwrap();
        assert_eq!(stored.parents, vec![parent]);
        assert_eq!(stored.tree, tree);
    }

    #[tokio::test]
    async fn new_commit_rejects_unresolved_parent() {
        let mut fx = Fixture::new();
        let tree = fx.repo.empty_tree().unwrap().hash();
        let err = NewCommit::run(
            &mut fx.ctx(),
            NewCommitArgs {
                info: info(),
                parents: vec![canopy_types::Hash::digest(b"ghost")],
                tree,
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_recoverable());
    }
}
