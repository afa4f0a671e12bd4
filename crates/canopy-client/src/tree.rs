//! Client-side tree values.
//!
//! A [`Tree`] is the pair (owning client session, server handle). Every
//! operation silently routes its request to the owning session. Trees from
//! a session that has since reconnected or closed are invalid; using one
//! fails with [`crate::ClientError::StaleTree`] on first use. Trees never
//! migrate between sessions.

use canopy_protocol::messages::{
    names, BatchOp, ListEntry, TreeAddArgs, TreeBatchArgs, TreeGraftArgs, TreeMergeArgs,
    TreePathArgs, TreeSpec,
};
use canopy_store::{Contents, LocalTree, TreeRef};
use canopy_types::{Hash, Path};

use crate::client::Client;
use crate::error::ClientResult;

/// A server-resident tree, addressed by a session-scoped handle.
#[derive(Clone)]
pub struct Tree {
    client: Client,
    generation: u64,
    id: u64,
}

impl Tree {
    pub(crate) fn new(client: Client, generation: u64, id: u64) -> Self {
        Self {
            client,
            generation,
            id,
        }
    }

    /// The server-side handle identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn spec(&self) -> TreeSpec {
        TreeSpec::Handle(self.id)
    }

    async fn produce<Req>(&self, name: &str, req: &Req) -> ClientResult<Tree>
    where
        Req: serde::Serialize + Sync,
    {
        let (id, generation) = self
            .client
            .call_checked::<_, u64>(&[self.generation], name, req)
            .await?;
        Ok(self.client.wrap_tree(id, generation))
    }

    async fn query<Req, Res>(&self, name: &str, req: &Req) -> ClientResult<Res>
    where
        Req: serde::Serialize + Sync,
        Res: serde::de::DeserializeOwned,
    {
        let (res, _) = self
            .client
            .call_checked(&[self.generation], name, req)
            .await?;
        Ok(res)
    }

    /// Bind contents at `path`, producing a new tree. This tree stays
    /// valid.
    pub async fn add(&self, path: &Path, contents: &Contents) -> ClientResult<Tree> {
        self.produce(
            names::TREE_ADD,
            &TreeAddArgs {
                tree: self.spec(),
                path: path.clone(),
                contents: contents.clone(),
            },
        )
        .await
    }

    /// Graft `other` at `path`, producing a new tree.
    pub async fn add_tree(&self, path: &Path, other: &Tree) -> ClientResult<Tree> {
        let (id, generation) = self
            .client
            .call_checked::<_, u64>(
                &[self.generation, other.generation],
                names::TREE_ADD_TREE,
                &TreeGraftArgs {
                    tree: self.spec(),
                    path: path.clone(),
                    other: other.spec(),
                },
            )
            .await?;
        Ok(self.client.wrap_tree(id, generation))
    }

    /// Unbind `path`, producing a new tree.
    pub async fn remove(&self, path: &Path) -> ClientResult<Tree> {
        self.produce(
            names::TREE_REMOVE,
            &TreePathArgs {
                tree: self.spec(),
                path: path.clone(),
            },
        )
        .await
    }

    /// Apply a sequence of operations in one round-trip.
    pub async fn batch(&self, ops: Vec<BatchOp>) -> ClientResult<Tree> {
        self.produce(
            names::TREE_BATCH,
            &TreeBatchArgs {
                tree: self.spec(),
                ops,
            },
        )
        .await
    }

    pub async fn find(&self, path: &Path) -> ClientResult<Option<Contents>> {
        self.query(
            names::TREE_FIND,
            &TreePathArgs {
                tree: self.spec(),
                path: path.clone(),
            },
        )
        .await
    }

    pub async fn mem(&self, path: &Path) -> ClientResult<bool> {
        self.query(
            names::TREE_MEM,
            &TreePathArgs {
                tree: self.spec(),
                path: path.clone(),
            },
        )
        .await
    }

    pub async fn mem_tree(&self, path: &Path) -> ClientResult<bool> {
        self.query(
            names::TREE_MEM_TREE,
            &TreePathArgs {
                tree: self.spec(),
                path: path.clone(),
            },
        )
        .await
    }

    pub async fn list(&self, path: &Path) -> ClientResult<Vec<ListEntry>> {
        self.query(
            names::TREE_LIST,
            &TreePathArgs {
                tree: self.spec(),
                path: path.clone(),
            },
        )
        .await
    }

    /// The content hash of this tree.
    pub async fn hash(&self) -> ClientResult<Hash> {
        self.query(names::TREE_HASH, &self.spec()).await
    }

    /// The kinded key of this tree.
    pub async fn key(&self) -> ClientResult<TreeRef> {
        self.query(names::TREE_KEY, &self.spec()).await
    }

    /// Materialize the whole tree client-side.
    pub async fn to_local(&self) -> ClientResult<LocalTree> {
        self.query(names::TREE_TO_LOCAL, &self.spec()).await
    }

    /// Persist the tree; the key kind reflects the tree's degree.
    pub async fn save(&self) -> ClientResult<TreeRef> {
        self.query(names::TREE_SAVE, &self.spec()).await
    }

    /// Three-way merge against `theirs`, producing a new tree. A conflict
    /// surfaces as a recoverable server error naming the path.
    pub async fn merge(&self, base: Option<&Tree>, theirs: &Tree) -> ClientResult<Tree> {
        let mut generations = vec![self.generation, theirs.generation];
        if let Some(base) = base {
            generations.push(base.generation);
        }
        let (id, generation) = self
            .client
            .call_checked::<_, u64>(
                &generations,
                names::TREE_MERGE,
                &TreeMergeArgs {
                    base: base.map(Tree::spec),
                    ours: self.spec(),
                    theirs: theirs.spec(),
                },
            )
            .await?;
        Ok(self.client.wrap_tree(id, generation))
    }

    /// Release the server handle. Returns `false` if it was already gone.
    pub async fn cleanup(self) -> ClientResult<bool> {
        self.query(names::TREE_CLEANUP, &self.id).await
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}
