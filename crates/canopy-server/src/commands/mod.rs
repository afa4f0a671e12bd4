//! The concrete command set.
//!
//! Grouped by surface: connectivity, branch management, store operations on
//! the session branch, server-resident trees, repository export/import, and
//! raw backend passthroughs.

pub mod backend;
pub mod branch;
pub mod connectivity;
pub mod repo;
pub mod store;
pub mod tree;

use canopy_protocol::messages::TreeSpec;
use canopy_store::{Tree, TreeRef};

use crate::error::ServerResult;
use crate::registry::Registry;
use crate::session::SessionCtx;

pub(crate) fn build_registry() -> Registry {
    let mut registry = Registry::new();
    connectivity::register(&mut registry);
    branch::register(&mut registry);
    store::register(&mut registry);
    tree::register(&mut registry);
    repo::register(&mut registry);
    backend::register(&mut registry);
    registry
}

/// Resolve a wire tree argument to a stored key.
///
/// Handles go through the session table (absent handles are a recoverable
/// error); local trees are persisted on receipt.
pub(crate) fn resolve_spec(ctx: &mut SessionCtx<'_>, spec: &TreeSpec) -> ServerResult<TreeRef> {
    match spec {
        TreeSpec::Handle(id) => {
            let tree = ctx.session.trees.get(*id)?.clone();
            Ok(ctx.repo.resolve_tree(&tree)?)
        }
        TreeSpec::Key(key) => Ok(*key),
        TreeSpec::Local(local) => Ok(ctx.repo.of_local(local)?),
    }
}

/// Bind a tree to a fresh session handle for the response.
pub(crate) fn stash(ctx: &mut SessionCtx<'_>, tree: TreeRef) -> u64 {
    ctx.session.trees.insert(Tree::Ref(tree))
}
