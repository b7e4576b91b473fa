//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use monte::config::{ClientConfig, ConnectionConfig, ServerConfig};
use monte::rpc::{Inbound, Service};
use monte::{Client, Server};

/// A server bound to an ephemeral localhost port, serving in the background.
pub struct TestServer<I> {
    pub addr: SocketAddr,
    pub server: Arc<Server<Service<I>>>,
    pub task: JoinHandle<monte::Result<()>>,
}

pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        read_buffer_size: 16 * 1024,
        write_buffer_size: 16 * 1024,
        ..ConnectionConfig::default()
    }
}

/// Start a server with `config`, overriding its bind address.
pub async fn start_server<I: Inbound>(config: ServerConfig, inbound: I) -> TestServer<I> {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..config
    };
    let server = Arc::new(Server::new(config, connection_config(), inbound));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve(listener).await }
    });

    TestServer { addr, server, task }
}

pub fn client_for(addr: SocketAddr) -> Client {
    Client::new(
        ClientConfig {
            address: addr.to_string(),
            ..ClientConfig::default()
        },
        connection_config(),
    )
}

/// Records fire-and-forget messages; never answers requests.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    requests: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` messages arrived.
    pub async fn wait_for_messages(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.messages.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("messages did not arrive in time");
    }
}

impl Inbound for Recorder {
    async fn on_message(&self, payload: &[u8]) {
        self.messages.lock().unwrap().push(payload.to_vec());
    }

    async fn on_request(&self, _payload: &[u8]) -> Option<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// Poll `condition` until it holds or a few seconds pass.
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
