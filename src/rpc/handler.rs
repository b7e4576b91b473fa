//! Capability traits for application code.
//!
//! - [`Inbound`]: what to do with frames that are not responses
//! - [`Handler`]: what to do with a freshly secured connection

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::lifecycle::ShutdownSignal;
use crate::net::SecureStream;
use crate::rpc::conn::Conn;

/// Receives inbound frames that did not match a pending request.
///
/// Callbacks run inline on the connection's read loop, in arrival order. They
/// must not wait for a response on the same connection.
pub trait Inbound: Send + Sync + 'static {
    /// A fire-and-forget message (sequence 0).
    fn on_message(&self, payload: &[u8]) -> impl Future<Output = ()> + Send;

    /// A request from the peer. `Some` queues a reply tagged with the same sequence.
    fn on_request(&self, payload: &[u8]) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// Invoked once per accepted and secured connection.
pub trait Handler: Send + Sync + 'static {
    fn handle<S>(
        &self,
        stream: SecureStream<S>,
        shutdown: ShutdownSignal,
    ) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static;
}

/// Runs a fresh [`Conn`] per connection, dispatching to one shared [`Inbound`].
#[derive(Debug)]
pub struct Service<I> {
    inbound: Arc<I>,
    config: ConnectionConfig,
}

impl<I: Inbound> Service<I> {
    pub fn new(config: ConnectionConfig, inbound: I) -> Self {
        Self {
            inbound: Arc::new(inbound),
            config,
        }
    }
}

impl<I: Inbound> Handler for Service<I> {
    fn handle<S>(
        &self,
        stream: SecureStream<S>,
        shutdown: ShutdownSignal,
    ) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Conn::new(self.config.clone(), Arc::clone(&self.inbound));
        async move { conn.handle(stream, shutdown).await }
    }
}

/// Replies to every request with its own payload; logs messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Inbound for Echo {
    async fn on_message(&self, payload: &[u8]) {
        tracing::info!(len = payload.len(), "Message received");
    }

    async fn on_request(&self, payload: &[u8]) -> Option<Vec<u8>> {
        Some(payload.to_vec())
    }
}
