//! Connection management and the typed command surface.

use std::sync::Arc;

use canopy_protocol::messages::{
    names, BranchCasArgs, BranchSetArgs, ExportArgs, HeadArgs, KeyedValue, MergeKeysArgs,
    NewCommitArgs, RemoveArgs, SetArgs, SetHeadArgs, SetTreeArgs, TestAndSetArgs,
    TestAndSetTreeArgs, TreeSpec,
};
use canopy_protocol::{
    handshake, BoxedStream, Connection, Endpoint, ProtocolError, WireFormat, STATUS_ERROR,
    STATUS_OK, STATUS_PUSH,
};
use canopy_store::{BranchEvent, Commit, Contents, MergeOutcome, Node, Slice};
use canopy_types::{CommitInfo, Hash, Path};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::tree::Tree;

/// Client configuration: where to connect, and whether to require TLS.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub uri: String,
    pub tls: bool,
}

impl ClientConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            tls: false,
        }
    }
}

/// Callback receiving pushed branch events.
pub type WatchHandler = Arc<dyn Fn(&BranchEvent) + Send + Sync>;

pub(crate) struct ClientInner {
    endpoint: Endpoint,
    conn: Option<Connection>,
    format: WireFormat,
    /// Bumped on every (re)connect; tree values carry the generation they
    /// were allocated under.
    generation: u64,
    watch_handler: Option<WatchHandler>,
}

/// A connection to a Canopy server.
///
/// Cheap to clone; clones share one connection and serialize their
/// requests through it. Callers wanting parallelism open multiple clients.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Mutex<ClientInner>>,
}

impl Client {
    /// Create a client. The connection is opened on first use.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let mut endpoint = Endpoint::parse(&config.uri)?;
        if config.tls {
            endpoint = endpoint.with_tls();
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(ClientInner {
                endpoint,
                conn: None,
                format: WireFormat::Binary,
                generation: 0,
                watch_handler: None,
            })),
        })
    }

    /// Create a client and connect eagerly.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let client = Self::new(config)?;
        client.inner.lock().await.ensure_connected().await?;
        Ok(client)
    }

    /// Issue a raw request by command name.
    ///
    /// The typed methods below are wrappers over this.
    pub async fn call<Req, Res>(&self, name: &str, req: &Req) -> ClientResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        self.inner.lock().await.call(name, req).await
    }

    /// Like [`Client::call`], but checks tree generations first and
    /// reports the generation the response was received under.
    pub(crate) async fn call_checked<Req, Res>(
        &self,
        generations: &[u64],
        name: &str,
        req: &Req,
    ) -> ClientResult<(Res, u64)>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let mut inner = self.inner.lock().await;
        for generation in generations {
            if *generation != inner.generation {
                return Err(ClientError::StaleTree);
            }
        }
        let res = inner.call(name, req).await?;
        Ok((res, inner.generation))
    }

    pub(crate) fn wrap_tree(&self, id: u64, generation: u64) -> Tree {
        Tree::new(self.clone(), generation, id)
    }

    /// Drop the current connection. The next request reconnects.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.conn = None;
        inner.generation += 1;
    }

    // -- connectivity -------------------------------------------------------

    pub async fn ping(&self) -> ClientResult<()> {
        self.call(names::PING, &()).await
    }

    // -- branch management --------------------------------------------------

    pub async fn set_current_branch(&self, branch: &str) -> ClientResult<()> {
        self.call(names::SET_CURRENT_BRANCH, &branch.to_string()).await
    }

    pub async fn get_current_branch(&self) -> ClientResult<String> {
        self.call(names::GET_CURRENT_BRANCH, &()).await
    }

    /// The head of `branch`, or of the session's branch when `None`.
    pub async fn head(&self, branch: Option<&str>) -> ClientResult<Option<Hash>> {
        self.call(
            names::HEAD,
            &HeadArgs {
                branch: branch.map(str::to_string),
            },
        )
        .await
    }

    pub async fn set_head(&self, branch: Option<&str>, commit: Hash) -> ClientResult<()> {
        self.call(
            names::SET_HEAD,
            &SetHeadArgs {
                branch: branch.map(str::to_string),
                commit,
            },
        )
        .await
    }

    pub async fn remove_branch(&self, branch: &str) -> ClientResult<bool> {
        self.call(names::REMOVE_BRANCH, &branch.to_string()).await
    }

    // -- store operations on the current branch -----------------------------

    pub async fn find(&self, path: &Path) -> ClientResult<Option<Contents>> {
        self.call(names::FIND, path).await
    }

    pub async fn mem(&self, path: &Path) -> ClientResult<bool> {
        self.call(names::MEM, path).await
    }

    pub async fn mem_tree(&self, path: &Path) -> ClientResult<bool> {
        self.call(names::MEM_TREE, path).await
    }

    pub async fn find_tree(&self, path: &Path) -> ClientResult<Option<Tree>> {
        let (id, generation) = self
            .call_checked::<_, Option<u64>>(&[], names::FIND_TREE, path)
            .await?;
        Ok(id.map(|id| self.wrap_tree(id, generation)))
    }

    pub async fn set(
        &self,
        path: &Path,
        info: &CommitInfo,
        contents: &Contents,
    ) -> ClientResult<Hash> {
        self.call(
            names::SET,
            &SetArgs {
                path: path.clone(),
                info: info.clone(),
                contents: contents.clone(),
            },
        )
        .await
    }

    pub async fn set_tree(&self, path: &Path, info: &CommitInfo, tree: &Tree) -> ClientResult<Hash> {
        let (commit, _) = self
            .call_checked(
                &[tree.generation()],
                names::SET_TREE,
                &SetTreeArgs {
                    path: path.clone(),
                    info: info.clone(),
                    tree: TreeSpec::Handle(tree.id()),
                },
            )
            .await?;
        Ok(commit)
    }

    pub async fn remove(&self, path: &Path, info: &CommitInfo) -> ClientResult<Hash> {
        self.call(
            names::REMOVE,
            &RemoveArgs {
                path: path.clone(),
                info: info.clone(),
            },
        )
        .await
    }

    /// Compare-and-swap contents at `path`; `Ok(false)` on disagreement.
    pub async fn test_and_set(
        &self,
        path: &Path,
        info: &CommitInfo,
        test: Option<&Contents>,
        set: Option<&Contents>,
    ) -> ClientResult<bool> {
        self.call(
            names::TEST_AND_SET,
            &TestAndSetArgs {
                path: path.clone(),
                info: info.clone(),
                test: test.cloned(),
                set: set.cloned(),
            },
        )
        .await
    }

    pub async fn test_and_set_tree(
        &self,
        path: &Path,
        info: &CommitInfo,
        test: Option<&Tree>,
        set: Option<&Tree>,
    ) -> ClientResult<bool> {
        let generations: Vec<u64> = test
            .iter()
            .chain(set.iter())
            .map(|t| t.generation())
            .collect();
        let (ok, _) = self
            .call_checked(
                &generations,
                names::TEST_AND_SET_TREE,
                &TestAndSetTreeArgs {
                    path: path.clone(),
                    info: info.clone(),
                    test: test.map(|t| TreeSpec::Handle(t.id())),
                    set: set.map(|t| TreeSpec::Handle(t.id())),
                },
            )
            .await?;
        Ok(ok)
    }

    // -- server-resident trees ----------------------------------------------

    /// A handle to the empty tree.
    pub async fn tree_empty(&self) -> ClientResult<Tree> {
        let (id, generation) = self.call_checked(&[], names::TREE_EMPTY, &()).await?;
        Ok(self.wrap_tree(id, generation))
    }

    pub async fn tree_of_path(&self, path: &Path) -> ClientResult<Option<Tree>> {
        let (id, generation) = self
            .call_checked::<_, Option<u64>>(&[], names::TREE_OF_PATH, path)
            .await?;
        Ok(id.map(|id| self.wrap_tree(id, generation)))
    }

    pub async fn tree_of_hash(&self, hash: Hash) -> ClientResult<Option<Tree>> {
        let (id, generation) = self
            .call_checked::<_, Option<u64>>(&[], names::TREE_OF_HASH, &hash)
            .await?;
        Ok(id.map(|id| self.wrap_tree(id, generation)))
    }

    pub async fn tree_of_commit(&self, commit: Hash) -> ClientResult<Tree> {
        let (id, generation) = self.call_checked(&[], names::TREE_OF_COMMIT, &commit).await?;
        Ok(self.wrap_tree(id, generation))
    }

    // -- repository ---------------------------------------------------------

    pub async fn export(&self, depth: Option<u32>) -> ClientResult<Slice> {
        self.call(names::EXPORT, &ExportArgs { depth }).await
    }

    pub async fn import(&self, slice: &Slice) -> ClientResult<u64> {
        self.call(names::IMPORT, slice).await
    }

    pub async fn new_commit(
        &self,
        info: &CommitInfo,
        parents: Vec<Hash>,
        tree: Hash,
    ) -> ClientResult<Hash> {
        self.call(
            names::NEW_COMMIT,
            &NewCommitArgs {
                info: info.clone(),
                parents,
                tree,
            },
        )
        .await
    }

    // -- backend passthrough: object stores ---------------------------------

    pub async fn contents_mem(&self, hash: Hash) -> ClientResult<bool> {
        self.call(names::CONTENTS_MEM, &hash).await
    }

    pub async fn contents_find(&self, hash: Hash) -> ClientResult<Option<Contents>> {
        self.call(names::CONTENTS_FIND, &hash).await
    }

    pub async fn contents_add(&self, contents: &Contents) -> ClientResult<Hash> {
        self.call(names::CONTENTS_ADD, contents).await
    }

    pub async fn contents_unsafe_add(&self, hash: Hash, contents: &Contents) -> ClientResult<()> {
        self.call(
            names::CONTENTS_UNSAFE_ADD,
            &KeyedValue {
                hash,
                value: contents.clone(),
            },
        )
        .await
    }

    pub async fn contents_index(&self, hash: Hash) -> ClientResult<Option<Hash>> {
        self.call(names::CONTENTS_INDEX, &hash).await
    }

    pub async fn contents_merge(
        &self,
        base: Option<Hash>,
        ours: Option<Hash>,
        theirs: Option<Hash>,
    ) -> ClientResult<MergeOutcome<Option<Hash>>> {
        self.call(names::CONTENTS_MERGE, &MergeKeysArgs { base, ours, theirs })
            .await
    }

    pub async fn node_mem(&self, hash: Hash) -> ClientResult<bool> {
        self.call(names::NODE_MEM, &hash).await
    }

    pub async fn node_find(&self, hash: Hash) -> ClientResult<Option<Node>> {
        self.call(names::NODE_FIND, &hash).await
    }

    pub async fn node_add(&self, node: &Node) -> ClientResult<Hash> {
        self.call(names::NODE_ADD, node).await
    }

    pub async fn node_unsafe_add(&self, hash: Hash, node: &Node) -> ClientResult<()> {
        self.call(
            names::NODE_UNSAFE_ADD,
            &KeyedValue {
                hash,
                value: node.clone(),
            },
        )
        .await
    }

    pub async fn node_index(&self, hash: Hash) -> ClientResult<Option<Hash>> {
        self.call(names::NODE_INDEX, &hash).await
    }

    pub async fn node_merge(
        &self,
        base: Option<Hash>,
        ours: Option<Hash>,
        theirs: Option<Hash>,
    ) -> ClientResult<MergeOutcome<Option<Hash>>> {
        self.call(names::NODE_MERGE, &MergeKeysArgs { base, ours, theirs })
            .await
    }

    pub async fn commit_mem(&self, hash: Hash) -> ClientResult<bool> {
        self.call(names::COMMIT_MEM, &hash).await
    }

    pub async fn commit_find(&self, hash: Hash) -> ClientResult<Option<Commit>> {
        self.call(names::COMMIT_FIND, &hash).await
    }

    pub async fn commit_add(&self, commit: &Commit) -> ClientResult<Hash> {
        self.call(names::COMMIT_ADD, commit).await
    }

    pub async fn commit_unsafe_add(&self, hash: Hash, commit: &Commit) -> ClientResult<()> {
        self.call(
            names::COMMIT_UNSAFE_ADD,
            &KeyedValue {
                hash,
                value: commit.clone(),
            },
        )
        .await
    }

    pub async fn commit_index(&self, hash: Hash) -> ClientResult<Option<Hash>> {
        self.call(names::COMMIT_INDEX, &hash).await
    }

    pub async fn commit_merge(
        &self,
        base: Option<Hash>,
        ours: Option<Hash>,
        theirs: Option<Hash>,
    ) -> ClientResult<MergeOutcome<Option<Hash>>> {
        self.call(names::COMMIT_MERGE, &MergeKeysArgs { base, ours, theirs })
            .await
    }

    // -- backend passthrough: branch registry -------------------------------

    pub async fn branch_mem(&self, branch: &str) -> ClientResult<bool> {
        self.call(names::BRANCH_MEM, &branch.to_string()).await
    }

    pub async fn branch_find(&self, branch: &str) -> ClientResult<Option<Hash>> {
        self.call(names::BRANCH_FIND, &branch.to_string()).await
    }

    pub async fn branch_set(&self, branch: &str, head: Hash) -> ClientResult<()> {
        self.call(
            names::BRANCH_SET,
            &BranchSetArgs {
                branch: branch.to_string(),
                head,
            },
        )
        .await
    }

    pub async fn branch_test_and_set(
        &self,
        branch: &str,
        test: Option<Hash>,
        set: Option<Hash>,
    ) -> ClientResult<bool> {
        self.call(
            names::BRANCH_TEST_AND_SET,
            &BranchCasArgs {
                branch: branch.to_string(),
                test,
                set,
            },
        )
        .await
    }

    pub async fn branch_remove(&self, branch: &str) -> ClientResult<bool> {
        self.call(names::BRANCH_REMOVE, &branch.to_string()).await
    }

    pub async fn branches(&self) -> ClientResult<Vec<String>> {
        self.call(names::BRANCH_LIST, &()).await
    }

    pub async fn branch_clear(&self) -> ClientResult<()> {
        self.call(names::BRANCH_CLEAR, &()).await
    }

    // -- watches ------------------------------------------------------------

    /// Install a watch over all branches; pushed events are handed to
    /// `handler`. At most one per session.
    pub async fn watch(&self, handler: WatchHandler) -> ClientResult<()> {
        self.inner.lock().await.watch_handler = Some(handler);
        self.call(names::BRANCH_WATCH, &()).await
    }

    /// Install a watch over one branch. At most one per session.
    pub async fn watch_key(&self, branch: &str, handler: WatchHandler) -> ClientResult<()> {
        self.inner.lock().await.watch_handler = Some(handler);
        self.call(names::BRANCH_WATCH_KEY, &branch.to_string()).await
    }

    /// Remove this session's watches.
    pub async fn unwatch(&self) -> ClientResult<bool> {
        let removed = self.call(names::BRANCH_UNWATCH, &()).await?;
        self.inner.lock().await.watch_handler = None;
        Ok(removed)
    }
}

impl ClientInner {
    async fn ensure_connected(&mut self) -> ClientResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream: BoxedStream = match &self.endpoint {
            Endpoint::Tcp { tls: true, .. } => {
                return Err(ClientError::Config(
                    "this build does not initiate TLS; connect through a TLS tunnel".into(),
                ));
            }
            Endpoint::Tcp { host, port, .. } => Box::new(
                TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(ProtocolError::Io)?,
            ),
            Endpoint::Unix { path } => {
                Box::new(UnixStream::connect(path).await.map_err(ProtocolError::Io)?)
            }
        };
        let mut conn = Connection::new(stream);
        let format = handshake::initiate(&mut conn).await?;
        tracing::debug!(endpoint = %self.endpoint, "connected");
        self.conn = Some(conn);
        self.format = format;
        self.generation += 1;
        Ok(())
    }

    async fn write_request<Req: Serialize>(&mut self, name: &str, req: &Req) -> ClientResult<()> {
        let format = self.format;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| ClientError::Config("not connected".into()))?;
        conn.write_header(name).await?;
        conn.write_value(format, req).await?;
        conn.flush().await?;
        Ok(())
    }

    pub(crate) async fn call<Req, Res>(&mut self, name: &str, req: &Req) -> ClientResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        // If the transport dies at connect time, mid-write, or before a
        // response arrives, reconnect (fresh handshake) and retry this one
        // request exactly once. Only the current request is ever replayed;
        // further failures surface to the caller.
        let mut retried = false;
        loop {
            match self.attempt(name, req).await {
                Ok(res) => return Ok(res),
                Err(e) if e.is_peer_closed() && !retried => {
                    tracing::debug!(command = %name, "transport lost; reconnecting once");
                    self.conn = None;
                    retried = true;
                }
                Err(e) => {
                    if matches!(e, ClientError::Protocol(_)) {
                        self.conn = None;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn attempt<Req, Res>(&mut self, name: &str, req: &Req) -> ClientResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        self.ensure_connected().await?;
        self.write_request(name, req).await?;
        self.read_response(name).await
    }

    async fn read_response<Res: DeserializeOwned>(&mut self, name: &str) -> ClientResult<Res> {
        let format = self.format;
        loop {
            let conn = self
                .conn
                .as_mut()
                .ok_or_else(|| ClientError::Config("not connected".into()))?;
            match conn.read_status().await? {
                STATUS_OK => return Ok(conn.read_value(format).await?),
                STATUS_ERROR => {
                    let message = conn.read_error_message().await?;
                    return Err(ClientError::Remote(message));
                }
                // A pushed watch notification arrived ahead of the
                // response; deliver it and keep reading.
                STATUS_PUSH => {
                    let event: BranchEvent = conn.read_value(format).await?;
                    if let Some(handler) = &self.watch_handler {
                        handler(&event);
                    }
                }
                other => {
                    return Err(ClientError::Protocol(ProtocolError::Framing(format!(
                        "unexpected status byte {other} in response to {name:?}"
                    ))));
                }
            }
        }
    }
}
