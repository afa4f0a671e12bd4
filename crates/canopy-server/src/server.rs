//! The listener and the per-session dispatch loop.
//!
//! Each accepted connection is handshaken and then served by its own task:
//! a strictly serial loop reading one request at a time, in arrival order,
//! with exactly one response per accepted request. Watch notifications are
//! forwarded by a side task through the shared write half; the write-half
//! mutex guarantees a push never splits a request/response pair.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use canopy_protocol::{
    handshake, BoxedStream, Connection, Endpoint, FrameReader, FrameWriter, ProtocolError,
    WireFormat, STATUS_PUSH,
};
use canopy_store::Repo;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, Mutex};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::registry;
use crate::session::{Session, SessionCtx};

/// Delay inserted after a recoverable handler failure, as back-pressure
/// against misbehaving clients.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A configured but not yet bound server.
pub struct Server {
    config: ServerConfig,
    repo: Arc<Repo>,
}

impl Server {
    pub fn new(config: ServerConfig, repo: Arc<Repo>) -> Self {
        Self { config, repo }
    }

    /// Bind the configured endpoint.
    pub async fn bind(self) -> ServerResult<BoundServer> {
        if let Some(port) = self.config.graphql_port {
            tracing::warn!(port, "graphql interface is not built in; ignoring graphql_port");
        }
        let endpoint = Endpoint::parse(&self.config.uri)?;
        let (listener, socket_guard) = match &endpoint {
            Endpoint::Tcp { tls: true, .. } => {
                return Err(ServerError::Config(
                    "this build does not terminate TLS; front it with a TLS proxy and bind tcp://"
                        .into(),
                ));
            }
            Endpoint::Tcp { host, port, .. } => {
                let listener = TcpListener::bind((host.as_str(), *port)).await?;
                (Listener::Tcp(listener), None)
            }
            Endpoint::Unix { path } => {
                // A stale socket file from a previous run would make bind fail.
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path)?;
                (Listener::Unix(listener), Some(SocketGuard { path: path.clone() }))
            }
        };
        Ok(BoundServer {
            listener,
            endpoint,
            config: Arc::new(self.config),
            repo: self.repo,
            _socket_guard: socket_guard,
        })
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// Unlinks the Unix socket file when the server goes away.
struct SocketGuard {
    path: PathBuf,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A bound server, ready to accept sessions.
pub struct BoundServer {
    listener: Listener,
    endpoint: Endpoint,
    config: Arc<ServerConfig>,
    repo: Arc<Repo>,
    _socket_guard: Option<SocketGuard>,
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl BoundServer {
    /// The bound TCP address (for tests binding port 0).
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix(_) => None,
        }
    }

    /// Accept connections forever, one session task per connection.
    pub async fn serve(self) -> ServerResult<()> {
        tracing::info!(endpoint = %self.endpoint, "canopy server listening");
        loop {
            let stream: BoxedStream = match &self.listener {
                Listener::Tcp(listener) => {
                    let (stream, peer) = listener.accept().await?;
                    tracing::debug!(%peer, "accepted connection");
                    Box::new(stream)
                }
                Listener::Unix(listener) => {
                    let (stream, _) = listener.accept().await?;
                    tracing::debug!("accepted connection");
                    Box::new(stream)
                }
            };
            tokio::spawn(handle_session(
                stream,
                Arc::clone(&self.repo),
                Arc::clone(&self.config),
            ));
        }
    }
}

/// Serve one connection: handshake, then the dispatch loop.
pub async fn handle_session(stream: BoxedStream, repo: Arc<Repo>, config: Arc<ServerConfig>) {
    let mut conn = Connection::new(stream);
    let format = match handshake::accept(&mut conn).await {
        Ok(format) => format,
        Err(e) => {
            // Close without further I/O; the initiator sees a dead stream.
            tracing::debug!(error = %e, "handshake failed");
            return;
        }
    };

    let (mut reader, writer) = conn.split();
    let writer = Arc::new(Mutex::new(writer));
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(&repo, push_tx);
    let push_task = tokio::spawn(forward_pushes(push_rx, Arc::clone(&writer), format));

    let result = dispatch_loop(&mut reader, &writer, format, &mut session, &repo, &config).await;
    match result {
        Ok(()) => tracing::debug!("session closed by peer"),
        Err(ServerError::Protocol(ref e)) if e.is_peer_closed() => {
            tracing::debug!("session transport lost")
        }
        Err(e) => tracing::error!(error = %e, "session ended with fatal error"),
    }

    session.teardown(&repo);
    push_task.abort();
}

/// Forward branch events from the session's watchers as status-2 frames.
async fn forward_pushes(
    mut push_rx: mpsc::UnboundedReceiver<canopy_store::BranchEvent>,
    writer: Arc<Mutex<FrameWriter>>,
    format: WireFormat,
) {
    while let Some(event) = push_rx.recv().await {
        let mut w = writer.lock().await;
        let sent = async {
            w.write_status(STATUS_PUSH).await?;
            w.write_value(format, &event).await?;
            w.flush().await
        }
        .await;
        if let Err(e) = sent {
            tracing::debug!(error = %e, "watch push failed; stopping forwarder");
            break;
        }
    }
}

async fn dispatch_loop(
    reader: &mut FrameReader,
    writer: &Arc<Mutex<FrameWriter>>,
    format: WireFormat,
    session: &mut Session,
    repo: &Arc<Repo>,
    config: &ServerConfig,
) -> ServerResult<()> {
    loop {
        let name = match reader.read_header().await {
            Ok(name) => name,
            // The peer hung up between requests; terminate gracefully.
            Err(ProtocolError::PeerClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let Some(command) = registry().of_name(&name) else {
            tracing::warn!(command = %name, "unknown command");
            // Drain the body frame so the stream stays aligned for the
            // next request.
            reader.read_frame().await?;
            writer.lock().await.reply_error("unknown command").await?;
            continue;
        };

        tracing::debug!(command = %name, "dispatching");
        let mut ctx = SessionCtx {
            session: &mut *session,
            repo,
            config,
        };
        match command.dispatch(reader, writer, format, &mut ctx).await {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                tracing::debug!(command = %name, error = %e, "recoverable command failure");
                writer.lock().await.reply_error(&e.to_string()).await?;
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
            Err(e) => {
                tracing::error!(command = %name, error = %e, "fatal command failure");
                return Err(e);
            }
        }
    }
}
