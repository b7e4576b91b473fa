//! Outbound connections.
//!
//! # Data Flow
//! ```text
//! Client::connect(inbound)
//!     → admission.reserve()            (client-side connection ceiling)
//!     → TcpStream::connect + handshake (one deadline covers both)
//!     → spawn Conn::handle in the background
//!     → ClientConn                     (write / request through Deref)
//! ```
//!
//! # Design Decisions
//! - Each connection has its own cancellation so it can be closed alone;
//!   `Client::shutdown` cancels all of them
//! - Dropping a `ClientConn` closes the connection

use std::io;
use std::ops::Deref;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, ConnectionConfig};
use crate::error::{Error, Result, TimeoutKind};
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::handshake::{ClientHandshaker, Handshaker};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::rpc::conn::Conn;
use crate::rpc::handler::Inbound;
use crate::server::admission::Admission;

/// Dials peers and runs a connection engine for each.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    connection: ConnectionConfig,
    admission: Admission,
    handshaker: ClientHandshaker,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

impl Client {
    pub fn new(config: ClientConfig, connection: ConnectionConfig) -> Self {
        let admission = Admission::new(
            config.effective_max_connections(),
            config.max_conn_wait_timeout(),
        );
        Self {
            handshaker: ClientHandshaker::new(connection.frame_limits()),
            config,
            connection,
            admission,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Connect to the configured address.
    pub async fn connect<I: Inbound>(&self, inbound: I) -> Result<ClientConn<I>> {
        let address = self.config.address.clone();
        self.connect_to(&address, inbound).await
    }

    /// Connect to `address`, dispatching unsolicited frames to `inbound`.
    pub async fn connect_to<I: Inbound>(&self, address: &str, inbound: I) -> Result<ClientConn<I>> {
        let mut client_signal = self.shutdown.subscribe();
        let guard = self.tracker.track();
        let permit = self.admission.reserve(&mut client_signal).await?;

        let secured = with_deadline(self.config.handshake_timeout(), TimeoutKind::Handshake, async {
            let stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;
            self.handshaker.handshake(stream).await
        })
        .await;
        let secured = match secured {
            Ok(secured) => secured,
            Err(e) => {
                metrics::handshake_failed();
                tracing::debug!(%address, error = %e, "Connect failed");
                return Err(e);
            }
        };

        let conn = Arc::new(Conn::new(self.connection.clone(), Arc::new(inbound)));
        let local = Arc::new(Shutdown::new());
        tracing::debug!(%address, connection_id = %conn.id(), "Connected");

        let task = tokio::spawn({
            let conn = Arc::clone(&conn);
            let local = Arc::clone(&local);
            let local_signal = local.subscribe();
            async move {
                let _permit = permit;
                let _guard = guard;
                let _active = metrics::active_connection();

                let handle = conn.handle(secured, local_signal);
                tokio::pin!(handle);
                tokio::select! {
                    result = &mut handle => result,
                    _ = client_signal.cancelled() => {
                        local.trigger();
                        handle.await
                    }
                }
            }
        });

        Ok(ClientConn {
            conn,
            local,
            task: Some(task),
        })
    }

    /// Close every connection and wait for their tasks. Later `connect`
    /// calls fail with [`Error::Shutdown`].
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::debug!(
                active_connections = self.tracker.active_count(),
                "Client shutting down"
            );
        }
        self.tracker.wait_idle().await;
    }

    /// Connections whose tasks have not yet exited.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_count()
    }
}

/// An open client connection.
///
/// Derefs to [`Conn`] for `write`, `write_no_wait` and `request`.
#[derive(Debug)]
pub struct ClientConn<I> {
    conn: Arc<Conn<I>>,
    local: Arc<Shutdown>,
    task: Option<JoinHandle<Result<()>>>,
}

impl<I: Inbound> ClientConn<I> {
    /// Shared handle to the engine, usable from other tasks.
    pub fn conn(&self) -> &Arc<Conn<I>> {
        &self.conn
    }

    /// Wait for the connection to end on its own and return its terminal error.
    pub async fn join(mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| Error::Io(io::Error::other(e)))?,
            None => Ok(()),
        }
    }

    /// Flush queued writes, close the stream and wait for the task.
    pub async fn close(self) -> Result<()> {
        self.local.trigger();
        self.join().await
    }
}

impl<I> Deref for ClientConn<I> {
    type Target = Conn<I>;

    fn deref(&self) -> &Conn<I> {
        &self.conn
    }
}

impl<I> Drop for ClientConn<I> {
    fn drop(&mut self) {
        self.local.trigger();
    }
}
