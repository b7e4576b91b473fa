//! Accept loop and per-connection supervision.
//!
//! # Data Flow
//! ```text
//! listener.accept()
//!     → admission.reserve()        (try, then wait; shutdown preempts)
//!     → spawn connection task
//!         → handshake under deadline
//!         → handler.handle(secured, shutdown signal)
//!         → drop: slot released, stream closed, tracker decremented
//! ```
//!
//! # Design Decisions
//! - A connection that cannot get a slot in time is closed unhandled
//! - Transient accept errors back off; listener-level failures are returned
//! - `shutdown` waits for every admitted task, including ones mid-handshake

pub mod admission;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::config::{ConnectionConfig, ServerConfig};
use crate::error::{Error, Result, TimeoutKind};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::net::handshake::{Handshaker, ServerHandshaker};
use crate::net::listener::{classify_accept_error, Accept, AcceptErrorKind};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::rpc::handler::{Handler, Inbound, Service};

pub use admission::{Admission, AdmissionPermit};

/// Bounded, cooperatively stoppable server.
///
/// Share it behind an `Arc` to call [`Server::shutdown`] while
/// [`Server::serve`] runs.
#[derive(Debug)]
pub struct Server<H, K = ServerHandshaker> {
    handler: Arc<H>,
    handshaker: Arc<K>,
    config: ServerConfig,
    admission: Admission,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

impl<I: Inbound> Server<Service<I>> {
    /// Server that runs a fresh connection engine per connection, all
    /// dispatching to `inbound`.
    pub fn new(config: ServerConfig, connection: ConnectionConfig, inbound: I) -> Self {
        let handshaker = ServerHandshaker::new(connection.frame_limits());
        Self::with_parts(config, Service::new(connection, inbound), handshaker)
    }
}

impl<H: Handler, K: Handshaker> Server<H, K> {
    pub fn with_parts(config: ServerConfig, handler: H, handshaker: K) -> Self {
        let admission = Admission::new(
            config.effective_max_connections(),
            config.max_conn_wait_timeout(),
        );
        Self {
            handler: Arc::new(handler),
            handshaker: Arc::new(handshaker),
            config,
            admission,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            max_connections = self.admission.max(),
            "Listener bound"
        );
        Ok(listener)
    }

    /// Accept connections until shutdown or a fatal listener error.
    ///
    /// Returns `Ok(())` on shutdown and when the listener reports it is
    /// closed.
    pub async fn serve<L: Accept>(&self, mut listener: L) -> Result<()> {
        let mut signal = self.shutdown.subscribe();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = signal.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => match classify_accept_error(&e) {
                    AcceptErrorKind::Closed => {
                        tracing::info!(error = %e, "Listener closed");
                        return Ok(());
                    }
                    AcceptErrorKind::Transient => {
                        tracing::warn!(error = %e, "Accept failed, backing off");
                        tokio::select! {
                            biased;
                            _ = signal.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(self.config.accept_backoff()) => continue,
                        }
                    }
                    AcceptErrorKind::Fatal => {
                        tracing::error!(error = %e, "Accept failed");
                        return Err(e.into());
                    }
                },
            };

            // Tracked before admission so a concurrent `shutdown` either
            // waits for this task or the reservation below sees the trigger.
            let guard = self.tracker.track();
            let permit = match self.admission.reserve(&mut signal).await {
                Ok(permit) => permit,
                Err(Error::Shutdown) => return Ok(()),
                Err(e) => {
                    metrics::connection_rejected();
                    tracing::warn!(%peer_addr, error = %e, "Connection rejected");
                    continue;
                }
            };

            metrics::connection_accepted();
            tracing::debug!(
                %peer_addr,
                connection_id = %guard.id(),
                available_slots = self.admission.available(),
                "Connection accepted"
            );
            self.spawn_connection(stream, peer_addr, permit, guard);
        }
    }

    fn spawn_connection<S>(
        &self,
        stream: S,
        peer_addr: SocketAddr,
        permit: AdmissionPermit,
        guard: ConnectionGuard,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = Arc::clone(&self.handler);
        let handshaker = Arc::clone(&self.handshaker);
        let handshake_timeout = self.config.handshake_timeout();
        let signal = self.shutdown.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let _active = metrics::active_connection();
            run_connection(
                handler,
                handshaker,
                handshake_timeout,
                stream,
                peer_addr,
                guard.id(),
                signal,
            )
            .await;
            drop(guard);
        });
    }

    /// Stop accepting, cancel every connection and wait for their tasks.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::info!(
                active_connections = self.tracker.active_count(),
                "Server shutting down"
            );
        }
        self.tracker.wait_idle().await;
    }

    /// Connection tasks that have not yet exited.
    pub fn active_connections(&self) -> usize {
        self.tracker.active_count()
    }

    /// Free admission slots.
    pub fn available_slots(&self) -> usize {
        self.admission.available()
    }
}

async fn run_connection<H, K, S>(
    handler: Arc<H>,
    handshaker: Arc<K>,
    handshake_timeout: Option<Duration>,
    stream: S,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
    mut signal: ShutdownSignal,
) where
    H: Handler,
    K: Handshaker,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let handshake = with_deadline(
        handshake_timeout,
        TimeoutKind::Handshake,
        handshaker.handshake(stream),
    );

    let secured = tokio::select! {
        biased;
        _ = signal.cancelled() => {
            tracing::debug!(%peer_addr, %connection_id, "Shutdown during handshake");
            return;
        }
        secured = handshake => secured,
    };

    let secured = match secured {
        Ok(secured) => secured,
        Err(e) => {
            metrics::handshake_failed();
            tracing::debug!(%peer_addr, %connection_id, error = %e, "Handshake failed");
            return;
        }
    };

    match handler.handle(secured, signal).await {
        Ok(()) => tracing::debug!(%peer_addr, %connection_id, "Connection finished"),
        Err(e) => tracing::debug!(%peer_addr, %connection_id, error = %e, "Connection failed"),
    }
}
