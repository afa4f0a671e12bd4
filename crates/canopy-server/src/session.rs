//! Per-connection server state.
//!
//! A session is created after a successful handshake and destroyed on
//! disconnect. Its state (current branch, store view, tree handles,
//! watches) is mutated only by its own dispatch loop; cross-session
//! coordination happens solely through the shared repository.

use std::sync::Arc;

use canopy_store::{BranchEvent, BranchStore as _, BranchView, Repo, WatchId};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handles::TreeTable;

/// Mutable per-connection state.
pub struct Session {
    branch: String,
    view: BranchView,
    /// Server-resident trees this session has handed out handles for.
    pub trees: TreeTable,
    watch: Option<WatchId>,
    branch_watch: Option<WatchId>,
    push_tx: mpsc::UnboundedSender<BranchEvent>,
}

impl Session {
    /// A fresh session on the repository's default branch.
    pub fn new(repo: &Arc<Repo>, push_tx: mpsc::UnboundedSender<BranchEvent>) -> Self {
        let branch = repo.default_branch().to_string();
        Self {
            view: BranchView::new(Arc::clone(repo), branch.clone()),
            branch,
            trees: TreeTable::new(),
            watch: None,
            branch_watch: None,
            push_tx,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn view(&self) -> &BranchView {
        &self.view
    }

    /// Switch the session branch. The store view is rebuilt so it always
    /// matches `branch`.
    pub fn set_branch(&mut self, repo: &Arc<Repo>, branch: String) {
        self.view = BranchView::new(Arc::clone(repo), branch.clone());
        self.branch = branch;
    }

    /// Install the session's all-branches watch. At most one per session.
    pub fn install_watch(&mut self, repo: &Arc<Repo>) -> ServerResult<()> {
        if self.watch.is_some() {
            return Err(ServerError::WatchExists);
        }
        let tx = self.push_tx.clone();
        let id = repo.branches().watch(Box::new(move |event: &BranchEvent| {
            let _ = tx.send(event.clone());
        }))?;
        self.watch = Some(id);
        Ok(())
    }

    /// Install the session's single-branch watch. At most one per session.
    pub fn install_watch_key(&mut self, repo: &Arc<Repo>, branch: &str) -> ServerResult<()> {
        if self.branch_watch.is_some() {
            return Err(ServerError::WatchExists);
        }
        let tx = self.push_tx.clone();
        let id = repo.branches().watch_key(
            branch,
            Box::new(move |event: &BranchEvent| {
                let _ = tx.send(event.clone());
            }),
        )?;
        self.branch_watch = Some(id);
        Ok(())
    }

    /// Remove whatever watches are installed. Returns `true` if any were.
    pub fn remove_watches(&mut self, repo: &Arc<Repo>) -> ServerResult<bool> {
        let mut removed = false;
        if let Some(id) = self.watch.take() {
            removed |= repo.branches().unwatch(id)?;
        }
        if let Some(id) = self.branch_watch.take() {
            removed |= repo.branches().unwatch(id)?;
        }
        Ok(removed)
    }

    /// Release every session-scoped resource. Called on disconnect.
    pub fn teardown(&mut self, repo: &Arc<Repo>) {
        if let Err(e) = self.remove_watches(repo) {
            tracing::warn!(error = %e, "failed to remove watches during teardown");
        }
        self.trees.clear();
    }
}

/// Everything a command handler may touch.
pub struct SessionCtx<'a> {
    pub session: &'a mut Session,
    pub repo: &'a Arc<Repo>,
    pub config: &'a ServerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store::BranchStore;
    use canopy_types::Hash;

    fn session() -> (Session, Arc<Repo>, mpsc::UnboundedReceiver<BranchEvent>) {
        let repo = Arc::new(Repo::in_memory());
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(&repo, tx), repo, rx)
    }

    #[test]
    fn starts_on_default_branch() {
        let (session, repo, _rx) = session();
        assert_eq!(session.branch(), repo.default_branch());
        assert_eq!(session.view().branch(), session.branch());
    }

    #[test]
    fn set_branch_rebuilds_view() {
        let (mut session, repo, _rx) = session();
        session.set_branch(&repo, "dev".into());
        assert_eq!(session.branch(), "dev");
        assert_eq!(session.view().branch(), "dev");
    }

    #[test]
    fn at_most_one_watch_per_flavor() {
        let (mut session, repo, _rx) = session();
        session.install_watch(&repo).unwrap();
        assert!(matches!(
            session.install_watch(&repo),
            Err(ServerError::WatchExists)
        ));
        session.install_watch_key(&repo, "main").unwrap();
        assert!(matches!(
            session.install_watch_key(&repo, "main"),
            Err(ServerError::WatchExists)
        ));
    }

    #[test]
    fn watch_forwards_events_to_channel() {
        let (mut session, repo, mut rx) = session();
        session.install_watch(&repo).unwrap();
        repo.branches().set("main", Hash::digest(b"c1")).unwrap();
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, BranchEvent::Updated { branch, .. } if branch == "main"));
    }

    #[test]
    fn teardown_releases_watches_and_trees() {
        let (mut session, repo, mut rx) = session();
        session.install_watch(&repo).unwrap();
        session
            .trees
            .insert(canopy_store::Tree::Local(canopy_store::LocalTree::empty()));
        session.teardown(&repo);

        assert!(session.trees.is_empty());
        repo.branches().set("main", Hash::digest(b"c1")).unwrap();
        assert!(rx.try_recv().is_err(), "no events after teardown");
    }

    #[test]
    fn remove_watches_reports_whether_any_existed() {
        let (mut session, repo, _rx) = session();
        assert!(!session.remove_watches(&repo).unwrap());
        session.install_watch(&repo).unwrap();
        assert!(session.remove_watches(&repo).unwrap());
    }
}
