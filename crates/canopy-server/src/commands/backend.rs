//! Raw backend passthroughs: the object stores and the branch registry,
//! exposed operation by operation.
//!
//! These bypass the session's branch view entirely. `unsafe_add` trusts the
//! caller's hash; it is sound only when the caller has verified the hash
//! independently.

use async_trait::async_trait;
use canopy_protocol::messages::{names, BranchCasArgs, BranchSetArgs, KeyedValue, MergeKeysArgs};
use canopy_store::{BranchStore as _, Commit, Contents, MergeOutcome, Node, ObjectStore as _};
use canopy_types::Hash;

use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

// ---------------------------------------------------------------------------
// Contents store
// ---------------------------------------------------------------------------

pub struct ContentsMem;

#[async_trait]
impl Command for ContentsMem {
    const NAME: &'static str = names::CONTENTS_MEM;
    type Req = Hash;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<bool> {
        Ok(ctx.repo.contents().mem(&hash)?)
    }
}

pub struct ContentsFind;

#[async_trait]
impl Command for ContentsFind {
    const NAME: &'static str = names::CONTENTS_FIND;
    type Req = Hash;
    type Res = Option<Contents>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Contents>> {
        Ok(ctx.repo.contents_of(&hash)?)
    }
}

pub struct ContentsAdd;

#[async_trait]
impl Command for ContentsAdd {
    const NAME: &'static str = names::CONTENTS_ADD;
    type Req = Contents;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, contents: Contents) -> ServerResult<Hash> {
        Ok(ctx.repo.add_contents(&contents)?)
    }
}

pub struct ContentsUnsafeAdd;

#[async_trait]
impl Command for ContentsUnsafeAdd {
    const NAME: &'static str = names::CONTENTS_UNSAFE_ADD;
    type Req = KeyedValue<Contents>;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, req: KeyedValue<Contents>) -> ServerResult<()> {
        ctx.repo
            .contents()
            .unsafe_add(&req.hash, &req.value.to_stored_object())?;
        Ok(())
    }
}

pub struct ContentsIndex;

#[async_trait]
impl Command for ContentsIndex {
    const NAME: &'static str = names::CONTENTS_INDEX;
    type Req = Hash;
    type Res = Option<Hash>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Hash>> {
        Ok(ctx.repo.contents().index(&hash)?)
    }
}

pub struct ContentsMerge;

#[async_trait]
impl Command for ContentsMerge {
    const NAME: &'static str = names::CONTENTS_MERGE;
    type Req = MergeKeysArgs;
    type Res = MergeOutcome<Option<Hash>>;

    async fn run(
        ctx: &mut SessionCtx<'_>,
        req: MergeKeysArgs,
    ) -> ServerResult<MergeOutcome<Option<Hash>>> {
        Ok(ctx.repo.merge_contents_keys(
            req.base.as_ref(),
            req.ours.as_ref(),
            req.theirs.as_ref(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Node store
// ---------------------------------------------------------------------------

pub struct NodeMem;

#[async_trait]
impl Command for NodeMem {
    const NAME: &'static str = names::NODE_MEM;
    type Req = Hash;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<bool> {
        Ok(ctx.repo.nodes().mem(&hash)?)
    }
}

pub struct NodeFind;

#[async_trait]
impl Command for NodeFind {
    const NAME: &'static str = names::NODE_FIND;
    type Req = Hash;
    type Res = Option<Node>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Node>> {
        Ok(ctx.repo.node_of(&hash)?)
    }
}

pub struct NodeAdd;

#[async_trait]
impl Command for NodeAdd {
    const NAME: &'static str = names::NODE_ADD;
    type Req = Node;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, node: Node) -> ServerResult<Hash> {
        Ok(ctx.repo.add_node(&node)?)
    }
}

pub struct NodeUnsafeAdd;

#[async_trait]
impl Command for NodeUnsafeAdd {
    const NAME: &'static str = names::NODE_UNSAFE_ADD;
    type Req = KeyedValue<Node>;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, req: KeyedValue<Node>) -> ServerResult<()> {
        ctx.repo
            .nodes()
            .unsafe_add(&req.hash, &req.value.to_stored_object()?)?;
        Ok(())
    }
}

pub struct NodeIndex;

#[async_trait]
impl Command for NodeIndex {
    const NAME: &'static str = names::NODE_INDEX;
    type Req = Hash;
    type Res = Option<Hash>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Hash>> {
        Ok(ctx.repo.nodes().index(&hash)?)
    }
}

pub struct NodeMerge;

#[async_trait]
impl Command for NodeMerge {
    const NAME: &'static str = names::NODE_MERGE;
    type Req = MergeKeysArgs;
    type Res = MergeOutcome<Option<Hash>>;

    async fn run(
        ctx: &mut SessionCtx<'_>,
        req: MergeKeysArgs,
    ) -> ServerResult<MergeOutcome<Option<Hash>>> {
        Ok(ctx.repo.merge_node_keys(
            req.base.as_ref(),
            req.ours.as_ref(),
            req.theirs.as_ref(),
        )?)
    }
}

// ---------------------------------------------------------------------------
// Commit store
// ---------------------------------------------------------------------------

pub struct CommitMem;

#[async_trait]
impl Command for CommitMem {
    const NAME: &'static str = names::COMMIT_MEM;
    type Req = Hash;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<bool> {
        Ok(ctx.repo.commits().mem(&hash)?)
    }
}

pub struct CommitFind;

#[async_trait]
impl Command for CommitFind {
    const NAME: &'static str = names::COMMIT_FIND;
    type Req = Hash;
    type Res = Option<Commit>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Commit>> {
        Ok(ctx.repo.commit_of(&hash)?)
    }
}

pub struct CommitAdd;

#[async_trait]
impl Command for CommitAdd {
    const NAME: &'static str = names::COMMIT_ADD;
    type Req = Commit;
    type Res = Hash;

    async fn run(ctx: &mut SessionCtx<'_>, commit: Commit) -> ServerResult<Hash> {
        Ok(ctx.repo.add_commit(&commit)?)
    }
}

pub struct CommitUnsafeAdd;

#[async_trait]
impl Command for CommitUnsafeAdd {
    const NAME: &'static str = names::COMMIT_UNSAFE_ADD;
    type Req = KeyedValue<Commit>;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, req: KeyedValue<Commit>) -> ServerResult<()> {
        ctx.repo
            .commits()
            .unsafe_add(&req.hash, &req.value.to_stored_object()?)?;
        Ok(())
    }
}

pub struct CommitIndex;

#[async_trait]
impl Command for CommitIndex {
    const NAME: &'static str = names::COMMIT_INDEX;
    type Req = Hash;
    type Res = Option<Hash>;

    async fn run(ctx: &mut SessionCtx<'_>, hash: Hash) -> ServerResult<Option<Hash>> {
        Ok(ctx.repo.commits().index(&hash)?)
    }
}

pub struct CommitMerge;

#[async_trait]
impl Command for CommitMerge {
    const NAME: &'static str = names::COMMIT_MERGE;
    type Req = MergeKeysArgs;
    type Res = MergeOutcome<Option<Hash>>;

    async fn run(
        ctx: &mut SessionCtx<'_>,
        req: MergeKeysArgs,
    ) -> ServerResult<MergeOutcome<Option<Hash>>> {
        Ok(ctx.repo.merge_commit_keys(
            req.base.as_ref(),
            req.ours.as_ref(),
            req.theirs.as_ref(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Branch registry
// ---------------------------------------------------------------------------

pub struct BranchMem;

#[async_trait]
impl Command for BranchMem {
    const NAME: &'static str = names::BRANCH_MEM;
    type Req = String;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<bool> {
        Ok(ctx.repo.branches().mem(&branch)?)
    }
}

pub struct BranchFind;

#[async_trait]
impl Command for BranchFind {
    const NAME: &'static str = names::BRANCH_FIND;
    type Req = String;
    type Res = Option<Hash>;

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<Option<Hash>> {
        Ok(ctx.repo.branches().find(&branch)?)
    }
}

pub struct BranchSet;

#[async_trait]
impl Command for BranchSet {
    const NAME: &'static str = names::BRANCH_SET;
    type Req = BranchSetArgs;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, req: BranchSetArgs) -> ServerResult<()> {
        ctx.repo.branches().set(&req.branch, req.head)?;
        Ok(())
    }
}

pub struct BranchTestAndSet;

#[async_trait]
impl Command for BranchTestAndSet {
    const NAME: &'static str = names::BRANCH_TEST_AND_SET;
    type Req = BranchCasArgs;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, req: BranchCasArgs) -> ServerResult<bool> {
        Ok(ctx.repo.branches().test_and_set(
            &req.branch,
            req.test.as_ref(),
            req.set.as_ref(),
        )?)
    }
}

pub struct BranchRemove;

#[async_trait]
impl Command for BranchRemove {
    const NAME: &'static str = names::BRANCH_REMOVE;
    type Req = String;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<bool> {
        Ok(ctx.repo.branches().remove(&branch)?)
    }
}

pub struct BranchList;

#[async_trait]
impl Command for BranchList {
    const NAME: &'static str = names::BRANCH_LIST;
    type Req = ();
    type Res = Vec<String>;

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<Vec<String>> {
        Ok(ctx.repo.branches().list()?)
    }
}

pub struct BranchClear;

#[async_trait]
impl Command for BranchClear {
    const NAME: &'static str = names::BRANCH_CLEAR;
    type Req = ();
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<()> {
        ctx.repo.branches().clear()?;
        Ok(())
    }
}

/// `branch.watch`: push every branch change to this session.
pub struct BranchWatch;

#[async_trait]
impl Command for BranchWatch {
    const NAME: &'static str = names::BRANCH_WATCH;
    type Req = ();
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<()> {
        ctx.session.install_watch(ctx.repo)
    }
}

/// `branch.watch_key`: push changes of one branch to this session.
pub struct BranchWatchKey;

#[async_trait]
impl Command for BranchWatchKey {
    const NAME: &'static str = names::BRANCH_WATCH_KEY;
    type Req = String;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<()> {
        ctx.session.install_watch_key(ctx.repo, &branch)
    }
}

/// `branch.unwatch`: remove this session's watches.
pub struct BranchUnwatch;

#[async_trait]
impl Command for BranchUnwatch {
    const NAME: &'static str = names::BRANCH_UNWATCH;
    type Req = ();
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<bool> {
        ctx.session.remove_watches(ctx.repo)
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<ContentsMem>();
    registry.register::<ContentsFind>();
    registry.register::<ContentsAdd>();
    registry.register::<ContentsUnsafeAdd>();
    registry.register::<ContentsIndex>();
    registry.register::<ContentsMerge>();
    registry.register::<NodeMem>();
    registry.register::<NodeFind>();
    registry.register::<NodeAdd>();
    registry.register::<NodeUnsafeAdd>();
    registry.register::<NodeIndex>();
    registry.register::<NodeMerge>();
    registry.register::<CommitMem>();
    registry.register::<CommitFind>();
    registry.register::<CommitAdd>();
    registry.register::<CommitUnsafeAdd>();
    registry.register::<CommitIndex>();
    registry.register::<CommitMerge>();
    registry.register::<BranchMem>();
    registry.register::<BranchFind>();
    registry.register::<BranchSet>();
    registry.register::<BranchTestAndSet>();
    registry.register::<BranchRemove>();
    registry.register::<BranchList>();
    registry.register::<BranchClear>();
    registry.register::<BranchWatch>();
    registry.register::<BranchWatchKey>();
    registry.register::<BranchUnwatch>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Fixture;
    use canopy_store::BranchEvent;

    #[tokio::test]
    async fn contents_add_then_find() {
        let mut fx = Fixture::new();
        let hash = ContentsAdd::run(&mut fx.ctx(), Contents::from("payload"))
            .await
            .unwrap();
        assert!(ContentsMem::run(&mut fx.ctx(), hash).await.unwrap());
        assert_eq!(
            ContentsFind::run(&mut fx.ctx(), hash).await.unwrap(),
            Some(Contents::from("payload"))
        );
        assert_eq!(
            ContentsIndex::run(&mut fx.ctx(), hash).await.unwrap(),
            Some(hash)
        );
    }

    #[tokio::test]
    async fn equal_contents_share_a_key() {
        let mut fx = Fixture::new();
        let a = ContentsAdd::run(&mut fx.ctx(), Contents::from("same")).await.unwrap();
        let b = ContentsAdd::run(&mut fx.ctx(), Contents::from("same")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn unsafe_add_stores_at_caller_hash() {
        let mut fx = Fixture::new();
        let claimed = Hash::digest(b"claimed identity");
        ContentsUnsafeAdd::run(
            &mut fx.ctx(),
            KeyedValue {
                hash: claimed,
                value: Contents::from("data"),
            },
        )
        .await
        .unwrap();
        assert!(ContentsMem::run(&mut fx.ctx(), claimed).await.unwrap());
    }

    #[tokio::test]
    async fn node_store_roundtrip() {
        let mut fx = Fixture::new();
        let node = Node::empty();
        let hash = NodeAdd::run(&mut fx.ctx(), node.clone()).await.unwrap();
        assert!(NodeMem::run(&mut fx.ctx(), hash).await.unwrap());
        assert_eq!(NodeFind::run(&mut fx.ctx(), hash).await.unwrap(), Some(node));
    }

    #[tokio::test]
    async fn commit_store_roundtrip() {
        let mut fx = Fixture::new();
        let tree = fx.repo.empty_tree().unwrap().hash();
        let commit = Commit::new(canopy_types::CommitInfo::at("t", "m", 0), vec![], tree);
        let hash = CommitAdd::run(&mut fx.ctx(), commit.clone()).await.unwrap();
        assert_eq!(
            CommitFind::run(&mut fx.ctx(), hash).await.unwrap(),
            Some(commit)
        );
    }

    #[tokio::test]
    async fn contents_merge_reports_conflicts_as_data() {
        let mut fx = Fixture::new();
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let outcome = ContentsMerge::run(
            &mut fx.ctx(),
            MergeKeysArgs {
                base: None,
                ours: Some(a),
                theirs: Some(b),
            },
        )
        .await
        .unwrap();
        assert!(matches!(outcome, MergeOutcome::Conflict { .. }));
    }

    #[tokio::test]
    async fn branch_registry_cycle() {
        let mut fx = Fixture::new();
        let head = {
            let view = fx.session.view().clone();
            view.set(
                &canopy_types::Path::parse("k").unwrap(),
                &canopy_types::CommitInfo::at("t", "m", 0),
                &Contents::from("v"),
            )
            .unwrap()
        };

        BranchSet::run(
            &mut fx.ctx(),
            BranchSetArgs {
                branch: "mirror".into(),
                head,
            },
        )
        .await
        .unwrap();
        assert!(BranchMem::run(&mut fx.ctx(), "mirror".into()).await.unwrap());
        assert_eq!(
            BranchFind::run(&mut fx.ctx(), "mirror".into()).await.unwrap(),
            Some(head)
        );
        assert_eq!(
            BranchList::run(&mut fx.ctx(), ()).await.unwrap(),
            vec!["main".to_string(), "mirror".to_string()]
        );

        assert!(BranchRemove::run(&mut fx.ctx(), "mirror".into()).await.unwrap());
        BranchClear::run(&mut fx.ctx(), ()).await.unwrap();
        assert!(BranchList::run(&mut fx.ctx(), ()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn branch_cas_passthrough() {
        let mut fx = Fixture::new();
        let c1 = Hash::digest(b"c1");
        assert!(BranchTestAndSet::run(
            &mut fx.ctx(),
            BranchCasArgs {
                branch: "b".into(),
                test: None,
                set: Some(c1),
            }
        )
        .await
        .unwrap());
        assert!(!BranchTestAndSet::run(
            &mut fx.ctx(),
            BranchCasArgs {
                branch: "b".into(),
                test: None,
                set: Some(c1),
            }
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn watch_pushes_events_until_unwatched() {
        let mut fx = Fixture::new();
        BranchWatch::run(&mut fx.ctx(), ()).await.unwrap();

        let head = Hash::digest(b"c1");
        BranchSet::run(
            &mut fx.ctx(),
            BranchSetArgs {
                branch: "watched".into(),
                head,
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            fx.push_rx.try_recv().unwrap(),
            BranchEvent::Updated { branch, .. } if branch == "watched"
        ));

        assert!(BranchUnwatch::run(&mut fx.ctx(), ()).await.unwrap());
        BranchSet::run(
            &mut fx.ctx(),
            BranchSetArgs {
                branch: "watched".into(),
                head,
            },
        )
        .await
        .unwrap();
        assert!(fx.push_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_watch_is_refused() {
        let mut fx = Fixture::new();
        BranchWatch::run(&mut fx.ctx(), ()).await.unwrap();
        let err = BranchWatch::run(&mut fx.ctx(), ()).await.unwrap_err();
        assert!(err.is_recoverable());
        // A key watch is a separate flavor and still allowed.
        BranchWatchKey::run(&mut fx.ctx(), "main".into()).await.unwrap();
    }
}
