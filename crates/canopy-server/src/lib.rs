//! Canopy server.
//!
//! Hosts a shared repository behind the framed binary protocol: one
//! cooperative task per connection, a strictly serial dispatch loop per
//! session, and session-scoped tree handles and watches that die with the
//! connection.

pub mod commands;
pub mod config;
pub mod error;
pub mod handles;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{ServerConfig, TlsConfig};
pub use error::{ServerError, ServerResult};
pub use registry::{registry, Command, Registry};
pub use server::{handle_session, BoundServer, Server};
pub use session::{Session, SessionCtx};

#[cfg(test)]
mod tests {
    //! End-to-end scenarios over real sockets: an in-memory repository, the
    //! full server stack, and the client crate talking to it.

    use std::sync::Arc;

    use canopy_client::{Client, ClientConfig, ClientError};
    use canopy_protocol::messages::{names, EntryKind, TreePathArgs, TreeSpec};
    use canopy_store::{Contents, ObjectStore as _, Repo};
    use canopy_types::{CommitInfo, Path};
    use tokio::sync::mpsc;

    use super::*;

    fn info() -> CommitInfo {
        CommitInfo::at("test", "e2e", 0)
    }

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    async fn spawn_server() -> (std::net::SocketAddr, Arc<Repo>) {
        let repo = Arc::new(Repo::in_memory());
        let server = Server::new(
            ServerConfig {
                uri: "tcp://127.0.0.1:0".into(),
                ..ServerConfig::default()
            },
            Arc::clone(&repo),
        );
        let bound = server.bind().await.unwrap();
        let addr = bound.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = bound.serve().await;
        });
        (addr, repo)
    }

    async fn client_for(addr: std::net::SocketAddr) -> Client {
        Client::connect(ClientConfig::new(format!("tcp://{addr}")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn s1_ping() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn s2_set_find_mem() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        client
            .set(&path("a/b"), &info(), &Contents::from("v1"))
            .await
            .unwrap();
        assert_eq!(
            client.find(&path("a/b")).await.unwrap(),
            Some(Contents::from("v1"))
        );
        assert_eq!(client.find(&path("a/c")).await.unwrap(), None);
        assert!(client.mem(&path("a/b")).await.unwrap());
        assert!(client.mem_tree(&path("a")).await.unwrap());
    }

    #[tokio::test]
    async fn s3_tree_handles() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        let h0 = client.tree_empty().await.unwrap();
        let h1 = h0.add(&path("x"), &Contents::from("X")).await.unwrap();
        let h2 = h1.add(&path("y"), &Contents::from("Y")).await.unwrap();

        let mut entries = h2.list(&Path::root()).await.unwrap();
        entries.sort_by(|a, b| a.step.cmp(&b.step));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].step, "x");
        assert_eq!(entries[0].kind, EntryKind::Contents);
        assert_eq!(entries[1].step, "y");
        assert_eq!(entries[1].kind, EntryKind::Contents);

        assert!(h0.cleanup().await.unwrap());
        assert!(h1.cleanup().await.unwrap());
        // Cleaning up the sources leaves h2 usable.
        assert!(h2.mem(&path("x")).await.unwrap());
    }

    #[tokio::test]
    async fn s4_cas_failure_changes_nothing() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        client
            .set(&path("k"), &info(), &Contents::from("A"))
            .await
            .unwrap();
        let ok = client
            .test_and_set(
                &path("k"),
                &info(),
                Some(&Contents::from("B")),
                Some(&Contents::from("C")),
            )
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(
            client.find(&path("k")).await.unwrap(),
            Some(Contents::from("A"))
        );
    }

    #[tokio::test]
    async fn s5_reconnect_after_server_restart() {
        // Serve exactly one session from a task we can kill outright,
        // listener included.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let repo = Arc::new(Repo::in_memory());
        let config = Arc::new(ServerConfig::default());

        let first = {
            let repo = Arc::clone(&repo);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                handle_session(Box::new(stream), repo, config).await;
            })
        };

        let client = client_for(addr).await;
        client
            .set(&path("k"), &info(), &Contents::from("A"))
            .await
            .unwrap();

        // Kill the socket from outside and restart on the same port,
        // backed by the same repository.
        first.abort();
        let _ = first.await;
        let server = Server::new(
            ServerConfig {
                uri: format!("tcp://{addr}"),
                ..ServerConfig::default()
            },
            Arc::clone(&repo),
        );
        let bound = server.bind().await.unwrap();
        tokio::spawn(async move {
            let _ = bound.serve().await;
        });

        // The client reconnects once, transparently.
        assert_eq!(
            client.find(&path("k")).await.unwrap(),
            Some(Contents::from("A"))
        );
    }

    #[tokio::test]
    async fn s6_unknown_command_keeps_connection_usable() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        let err = client
            .call::<(), ()>("no-such-command", &())
            .await
            .unwrap_err();
        match err {
            ClientError::Remote(message) => assert_eq!(message, "unknown command"),
            other => panic!("expected remote error, got {other}"),
        }
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn handle_isolation_between_sessions() {
        let (addr, _repo) = spawn_server().await;
        let c1 = client_for(addr).await;
        let c2 = client_for(addr).await;

        let tree = c1.tree_empty().await.unwrap();
        // The same integer in another session must not dereference.
        let err = c2
            .call::<TreePathArgs, bool>(
                names::TREE_MEM,
                &TreePathArgs {
                    tree: TreeSpec::Handle(tree.id()),
                    path: path("x"),
                },
            )
            .await
            .unwrap_err();
        match err {
            ClientError::Remote(message) => {
                assert!(message.contains("unknown tree handle"), "{message}")
            }
            other => panic!("expected remote error, got {other}"),
        }
        // The owning session still dereferences it fine.
        assert!(!tree.mem(&path("x")).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_arguments_keep_session_alive() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        // `find` expects a Path; a bare integer fails to decode.
        let err = client.call::<u64, Option<Contents>>(names::FIND, &7).await.unwrap_err();
        match err {
            ClientError::Remote(message) => assert_eq!(message, "Invalid arguments"),
            other => panic!("expected remote error, got {other}"),
        }
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn sequential_requests_answer_in_order() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        for i in 0..10 {
            let p = Path::parse(&format!("k{i}")).unwrap();
            client
                .set(&p, &info(), &Contents::from(format!("v{i}").as_str()))
                .await
                .unwrap();
        }
        for i in 0..10 {
            let p = Path::parse(&format!("k{i}")).unwrap();
            assert_eq!(
                client.find(&p).await.unwrap(),
                Some(Contents::from(format!("v{i}").as_str())),
                "k{i}"
            );
        }
    }

    #[tokio::test]
    async fn content_addressing_over_the_wire() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        let k1 = client.contents_add(&Contents::from("same")).await.unwrap();
        let k2 = client.contents_add(&Contents::from("same")).await.unwrap();
        assert_eq!(k1, k2);
        assert_eq!(
            client.contents_find(k1).await.unwrap(),
            Some(Contents::from("same"))
        );
        assert_eq!(client.contents_index(k1).await.unwrap(), Some(k1));
    }

    #[tokio::test]
    async fn branch_switching_and_heads() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        assert_eq!(client.get_current_branch().await.unwrap(), "main");
        let main_commit = client
            .set(&path("k"), &info(), &Contents::from("main-v"))
            .await
            .unwrap();

        client.set_current_branch("dev").await.unwrap();
        client
            .set(&path("k"), &info(), &Contents::from("dev-v"))
            .await
            .unwrap();
        assert_eq!(
            client.find(&path("k")).await.unwrap(),
            Some(Contents::from("dev-v"))
        );

        assert_eq!(client.head(Some("main")).await.unwrap(), Some(main_commit));
        let mut branches = client.branches().await.unwrap();
        branches.sort();
        assert_eq!(branches, vec!["dev", "main"]);

        assert!(client.remove_branch("dev").await.unwrap());
        assert_eq!(client.find(&path("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn export_import_between_servers() {
        let (addr_a, _repo_a) = spawn_server().await;
        let (addr_b, repo_b) = spawn_server().await;
        let a = client_for(addr_a).await;
        let b = client_for(addr_b).await;

        a.set(&path("a/b"), &info(), &Contents::from("v")).await.unwrap();
        let head = a.head(None).await.unwrap().unwrap();

        let slice = a.export(None).await.unwrap();
        assert!(!slice.is_empty());
        b.import(&slice).await.unwrap();
        b.set_head(Some("main"), head).await.unwrap();

        assert_eq!(
            b.find(&path("a/b")).await.unwrap(),
            Some(Contents::from("v"))
        );
        assert!(repo_b.commits().mem(&head).unwrap());
    }

    #[tokio::test]
    async fn watch_pushes_between_sessions() {
        let (addr, _repo) = spawn_server().await;
        let watcher = client_for(addr).await;
        let writer = client_for(addr).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        watcher
            .watch(Arc::new(move |event: &canopy_store::BranchEvent| {
                let _ = tx.send(event.clone());
            }))
            .await
            .unwrap();

        writer
            .set(&path("k"), &info(), &Contents::from("v"))
            .await
            .unwrap();
        // Give the push forwarder a beat to write the frame, then drive the
        // watcher connection so it reads the pushed notification.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        watcher.ping().await.unwrap();

        let event = rx.recv().await.expect("watch notification");
        assert_eq!(event.branch(), "main");
    }

    #[tokio::test]
    async fn trees_are_invalidated_by_reconnect() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        let tree = client.tree_empty().await.unwrap();
        client.close().await;
        let err = tree.mem(&path("x")).await.unwrap_err();
        assert!(matches!(err, ClientError::StaleTree));
    }

    #[tokio::test]
    async fn unix_socket_transport() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("canopy.sock");
        let uri = format!("unix://{}", socket.display());

        let repo = Arc::new(Repo::in_memory());
        let server = Server::new(
            ServerConfig {
                uri: uri.clone(),
                ..ServerConfig::default()
            },
            Arc::clone(&repo),
        );
        let bound = server.bind().await.unwrap();
        tokio::spawn(async move {
            let _ = bound.serve().await;
        });

        let client = Client::connect(ClientConfig::new(uri)).await.unwrap();
        client.ping().await.unwrap();
        client
            .set(&path("k"), &info(), &Contents::from("v"))
            .await
            .unwrap();
        assert_eq!(
            client.find(&path("k")).await.unwrap(),
            Some(Contents::from("v"))
        );
    }

    #[tokio::test]
    async fn tls_uri_is_refused_without_terminator() {
        let repo = Arc::new(Repo::in_memory());
        let server = Server::new(
            ServerConfig {
                uri: "tcp+tls://127.0.0.1:8888".into(),
                ..ServerConfig::default()
            },
            repo,
        );
        let err = server.bind().await.unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn merge_conflict_surfaces_with_path() {
        let (addr, _repo) = spawn_server().await;
        let client = client_for(addr).await;

        let base = client.tree_empty().await.unwrap();
        let ours = base.add(&path("k"), &Contents::from("1")).await.unwrap();
        let theirs = base.add(&path("k"), &Contents::from("2")).await.unwrap();

        let err = ours.merge(Some(&base), &theirs).await.unwrap_err();
        match err {
            ClientError::Remote(message) => assert!(message.contains("merge conflict"), "{message}"),
            other => panic!("expected remote error, got {other}"),
        }

        // Disjoint edits merge fine on the same handles.
        let ours = base.add(&path("a"), &Contents::from("A")).await.unwrap();
        let theirs = base.add(&path("b"), &Contents::from("B")).await.unwrap();
        let merged = ours.merge(Some(&base), &theirs).await.unwrap();
        assert!(merged.mem(&path("a")).await.unwrap());
        assert!(merged.mem(&path("b")).await.unwrap());
    }
}
