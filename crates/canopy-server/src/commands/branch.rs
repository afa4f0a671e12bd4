//! Branch management on the session: current branch, heads, removal.

use async_trait::async_trait;
use canopy_protocol::messages::{names, HeadArgs, SetHeadArgs};
use canopy_store::validate_branch_name;
use canopy_types::Hash;

use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

/// `set_current_branch`: switch the session branch and rebuild its view.
pub struct SetCurrentBranch;

#[async_trait]
impl Command for SetCurrentBranch {
    const NAME: &'static str = names::SET_CURRENT_BRANCH;
    type Req = String;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<()> {
        validate_branch_name(&branch)?;
        ctx.session.set_branch(ctx.repo, branch);
        Ok(())
    }
}

/// `get_current_branch`: the session's branch name.
pub struct GetCurrentBranch;

#[async_trait]
impl Command for GetCurrentBranch {
    const NAME: &'static str = names::GET_CURRENT_BRANCH;
    type Req = ();
    type Res = String;

    async fn run(ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<String> {
        Ok(ctx.session.branch().to_string())
    }
}

/// `head`: the current commit of a branch (the session's if omitted).
pub struct Head;

#[async_trait]
impl Command for Head {
    const NAME: &'static str = names::HEAD;
    type Req = HeadArgs;
    type Res = Option<Hash>;

    async fn run(ctx: &mut SessionCtx<'_>, req: HeadArgs) -> ServerResult<Option<Hash>> {
        let branch = req.branch.as_deref().unwrap_or(ctx.session.branch());
        Ok(ctx.repo.head(branch)?)
    }
}

/// `set_head`: atomically point a branch at an existing commit.
pub struct SetHead;

#[async_trait]
impl Command for SetHead {
    const NAME: &'static str = names::SET_HEAD;
    type Req = SetHeadArgs;
    type Res = ();

    async fn run(ctx: &mut SessionCtx<'_>, req: SetHeadArgs) -> ServerResult<()> {
        let branch = req.branch.as_deref().unwrap_or(ctx.session.branch());
        ctx.repo.set_head(branch, req.commit)?;
        Ok(())
    }
}

/// `remove_branch`: drop a branch mapping.
pub struct RemoveBranch;

#[async_trait]
impl Command for RemoveBranch {
    const NAME: &'static str = names::REMOVE_BRANCH;
    type Req = String;
    type Res = bool;

    async fn run(ctx: &mut SessionCtx<'_>, branch: String) -> ServerResult<bool> {
        Ok(ctx.repo.remove_branch(&branch)?)
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<SetCurrentBranch>();
    registry.register::<GetCurrentBranch>();
    registry.register::<Head>();
    registry.register::<SetHead>();
    registry.register::<RemoveBranch>();
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
    async fn current_branch_roundtrip() {
        let mut fx = Fixture::new();
        let branch = GetCurrentBranch::run(&mut fx.ctx(), ()).await.unwrap();
        assert_eq!(branch, "main");

        SetCurrentBranch::run(&mut fx.ctx(), "dev".into())
            .await
            .unwrap();
        assert_eq!(GetCurrentBranch::run(&mut fx.ctx(), ()).await.unwrap(), "dev");
        assert_eq!(fx.session.view().branch(), "dev");
    }

    #[tokio::test]
    async fn set_current_branch_validates_name() {
        let mut fx = Fixture::new();
        let err = SetCurrentBranch::run(&mut fx.ctx(), "bad name".into())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(fx.session.branch(), "main");
    }

    #[tokio::test]
    async fn head_defaults_to_session_branch() {
        let mut fx = Fixture::new();
        assert_eq!(
            Head::run(&mut fx.ctx(), HeadArgs { branch: None }).await.unwrap(),
            None
        );

        let commit = fx
            .session
            .view()
            .set(&Path::parse("k").unwrap(), &info(), &Contents::from("v"))
            .unwrap();
        assert_eq!(
            Head::run(&mut fx.ctx(), HeadArgs { branch: None }).await.unwrap(),
            Some(commit)
        );
        assert_eq!(
            Head::run(
                &mut fx.ctx(),
                HeadArgs {
                    branch: Some("other".into())
                }
            )
            .await
            .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn set_head_and_remove_branch() {
        let mut fx = Fixture::new();
        let commit = fx
            .session
            .view()
            .set(&Path::parse("k").unwrap(), &info(), &Contents::from("v"))
            .unwrap();

        SetHead::run(
            &mut fx.ctx(),
            SetHeadArgs {
                branch: Some("mirror".into()),
                commit,
            },
        )
        .await
        .unwrap();
        assert_eq!(fx.repo.head("mirror").unwrap(), Some(commit));

        assert!(RemoveBranch::run(&mut fx.ctx(), "mirror".into()).await.unwrap());
        assert!(!RemoveBranch::run(&mut fx.ctx(), "mirror".into()).await.unwrap());
    }

    #[tokio::test]
    async fn set_head_rejects_unknown_commit() {
        let mut fx = Fixture::new();
        let err = SetHead::run(
            &mut fx.ctx(),
            SetHeadArgs {
                branch: None,
                commit: canopy_types::Hash::digest(b"ghost"),
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_recoverable());
    }
}
