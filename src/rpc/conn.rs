//! Connection engine.
//!
//! # Responsibilities
//! - Serialize concurrent writes into one ordered frame stream
//! - Correlate responses with pending requests by sequence number
//! - Hand everything else to the application's [`Inbound`]
//! - Stop both loops cleanly on cancel, write error or read error
//!
//! # Structure
//! ```text
//! write / write_no_wait / request ──push──▶ queue ──notify──▶ write loop ──▶ SecureWriter
//!                                                                  ▲
//! SecureReader ──▶ read loop ──▶ dispatch ──reply────────────────┘
//!                                   ├── seq == 0        → Inbound::on_message
//!                                   ├── pending match   → resolve request
//!                                   └── otherwise       → Inbound::on_request
//! ```
//!
//! # Design Decisions
//! - One writer drains the queue; batches are swapped out under the lock and
//!   written outside it, in enqueue order
//! - Request registration and enqueue happen under the same lock
//! - A write error is sticky: later frames are not written, but every waiter
//!   is still released
//! - On cancel the reader keeps running until the writer has drained
//! - An engine drives exactly one stream; a second `handle` fails

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Notify};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result, TimeoutKind};
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::ConnectionId;
use crate::net::secure::{FrameLimits, SecureReader, SecureStream, SecureWriter};
use crate::observability::metrics;
use crate::protocol::frame::{self, Frame, NO_RESPONSE, TAG_LEN};
use crate::protocol::SequenceCounter;
use crate::resilience::with_deadline;
use crate::rpc::handler::Inbound;
use crate::rpc::pending::{PendingRequest, PendingWrite};

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting writes, not yet attached to a stream.
    Idle,
    /// Writer and reader loops are active.
    Running,
    /// The stream is gone; the engine cannot be reused.
    Closed,
}

#[derive(Debug)]
struct State {
    queue: Vec<PendingWrite>,
    writer_done: bool,
    phase: Phase,
    requests: HashMap<u32, PendingRequest>,
    seq: SequenceCounter,
}

impl State {
    /// Next sequence number not already awaiting a response.
    fn next_free_seq(&mut self) -> u32 {
        loop {
            let seq = self.seq.next();
            if !self.requests.contains_key(&seq) {
                return seq;
            }
        }
    }
}

/// One secured connection's write queue, request table and loops.
#[derive(Debug)]
pub struct Conn<I> {
    id: ConnectionId,
    state: Mutex<State>,
    wake: Notify,
    inbound: Arc<I>,
    config: ConnectionConfig,
    limits: FrameLimits,
}

impl<I: Inbound> Conn<I> {
    pub fn new(config: ConnectionConfig, inbound: Arc<I>) -> Self {
        Self {
            id: ConnectionId::new(),
            state: Mutex::new(State {
                queue: Vec::new(),
                writer_done: false,
                phase: Phase::Idle,
                requests: HashMap::new(),
                seq: SequenceCounter::new(),
            }),
            wake: Notify::new(),
            inbound,
            limits: config.frame_limits(),
            config,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.lock().requests.len()
    }

    /// Queue a fire-and-forget message and wait until it has been handed to
    /// the stream (not until it is flushed to the network).
    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        let rx = self.enqueue(NO_RESPONSE, buf, true)?;
        match rx {
            Some(rx) => match rx.await {
                Ok(true) => Ok(()),
                _ => Err(Error::Closed),
            },
            None => Ok(()),
        }
    }

    /// Queue a fire-and-forget message and return immediately.
    pub fn write_no_wait(&self, buf: &[u8]) -> Result<()> {
        self.enqueue(NO_RESPONSE, buf, false).map(drop)
    }

    /// Send `buf` as a request and wait for the matching response.
    ///
    /// The response is copied into `dst`, which must have enough capacity to
    /// hold it. On timeout, or if the returned future is dropped, the request
    /// is forgotten; a late response is then treated as a fresh inbound request.
    pub async fn request(&self, buf: &[u8], dst: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        frame::check_payload_len(buf.len(), self.limits.max_write_plaintext)?;
        let (mut pending, _) = PendingWrite::acquire(NO_RESPONSE, buf, false);
        let (tx, rx) = oneshot::channel();

        let seq = {
            let mut state = self.lock();
            if state.writer_done {
                drop(state);
                pending.complete(false);
                return Err(Error::Shutdown);
            }
            let seq = state.next_free_seq();
            state.requests.insert(seq, PendingRequest::new(dst, tx));
            pending.seq = seq;
            state.queue.push(pending);
            seq
        };
        self.wake.notify_one();

        let mut in_flight = InFlight { conn: self, seq, rx };
        match tokio::time::timeout(timeout, &mut in_flight.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                metrics::request_timed_out();
                tracing::debug!(connection_id = %self.id, seq, "Request timed out");
                Err(Error::Timeout(TimeoutKind::Request))
            }
        }
    }

    fn enqueue(&self, seq: u32, buf: &[u8], wait: bool) -> Result<Option<oneshot::Receiver<bool>>> {
        frame::check_payload_len(buf.len(), self.limits.max_write_plaintext)?;
        let (pending, rx) = PendingWrite::acquire(seq, buf, wait);
        self.push(pending)?;
        Ok(rx)
    }

    fn push(&self, pending: PendingWrite) -> Result<()> {
        let mut state = self.lock();
        if state.writer_done {
            drop(state);
            pending.complete(false);
            return Err(Error::Shutdown);
        }
        state.queue.push(pending);
        drop(state);
        self.wake.notify_one();
        Ok(())
    }

    /// Drive `stream` until `shutdown` fires or either loop stops.
    ///
    /// Returns the terminal error of whichever loop failed first; cancellation
    /// and a clean peer close both return `Ok(())`.
    pub async fn handle<S>(&self, stream: SecureStream<S>, mut shutdown: ShutdownSignal) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.begin()?;
        tracing::debug!(connection_id = %self.id, "Connection running");

        let (mut reader, mut writer) = stream.into_split();
        let (result, writer_failed) = {
            let write_loop = self.write_loop(&mut writer);
            let read_loop = self.read_loop(&mut reader);
            tokio::pin!(write_loop, read_loop);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(connection_id = %self.id, "Connection cancelled, draining writer");
                    self.stop_writer();
                    // Keep reading while draining so a peer that is draining
                    // towards us is not stalled on a full buffer.
                    let mut reading = true;
                    let drained = loop {
                        tokio::select! {
                            res = &mut write_loop => break res,
                            res = &mut read_loop, if reading => {
                                reading = false;
                                if let Err(e) = res {
                                    tracing::debug!(connection_id = %self.id, error = %e, "Reader failed while draining");
                                }
                            }
                        }
                    };
                    self.log_drain(&drained);
                    (Ok(()), drained.is_err())
                }
                res = &mut write_loop => {
                    let failed = res.is_err();
                    (res, failed)
                }
                res = &mut read_loop => {
                    self.stop_writer();
                    let drained = write_loop.await;
                    self.log_drain(&drained);
                    (res, drained.is_err())
                }
            }
        };

        // Reject new writes before the close.
        self.stop_writer();
        if writer_failed {
            tracing::trace!(connection_id = %self.id, "Writer failed, dropping stream without close");
        } else if let Err(e) =
            with_deadline(self.config.write_timeout(), TimeoutKind::Write, writer.close()).await
        {
            tracing::trace!(connection_id = %self.id, error = %e, "Stream close failed");
        }
        drop(reader);
        self.finish();

        match &result {
            Ok(()) => tracing::debug!(connection_id = %self.id, "Connection closed"),
            Err(e) => tracing::debug!(connection_id = %self.id, error = %e, "Connection terminated"),
        }
        result
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if state.phase != Phase::Idle {
            return Err(Error::Closed);
        }
        state.phase = Phase::Running;
        Ok(())
    }

    fn log_drain(&self, drained: &Result<()>) {
        if let Err(e) = drained {
            tracing::debug!(connection_id = %self.id, error = %e, "Writer failed while draining");
        }
    }

    fn stop_writer(&self) {
        self.lock().writer_done = true;
        self.wake.notify_one();
    }

    /// Fail everything still queued or pending. Runs once per engine.
    fn finish(&self) {
        let (queue, requests) = {
            let mut state = self.lock();
            state.writer_done = true;
            state.phase = Phase::Closed;
            (
                mem::take(&mut state.queue),
                mem::take(&mut state.requests),
            )
        };
        for pending in queue {
            pending.complete(false);
        }
        for (_, request) in requests {
            request.fail(Error::Closed);
        }
    }

    /// Wait until there is something to write or the writer should stop.
    async fn next_batch(&self) -> (bool, Vec<PendingWrite>) {
        loop {
            let notified = self.wake.notified();
            {
                let mut state = self.lock();
                if state.writer_done || !state.queue.is_empty() {
                    return (state.writer_done, mem::take(&mut state.queue));
                }
            }
            notified.await;
        }
    }

    async fn write_loop<W>(&self, writer: &mut SecureWriter<W>) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let write_timeout = self.config.write_timeout();
        let mut failure: Option<Error> = None;

        loop {
            let (done, batch) = self.next_batch().await;
            if batch.is_empty() {
                if done {
                    return Ok(());
                }
                continue;
            }

            let count = batch.len();
            for pending in batch {
                if failure.is_none() {
                    let written = with_deadline(
                        write_timeout,
                        TimeoutKind::Write,
                        writer.write_frame(pending.seq, &pending.buf),
                    )
                    .await;
                    if let Err(e) = written {
                        failure = Some(e);
                    }
                }
                pending.complete(failure.is_none());
            }

            if let Some(e) = failure {
                tracing::debug!(connection_id = %self.id, error = %e, "Write failed");
                return Err(e);
            }

            with_deadline(write_timeout, TimeoutKind::Write, writer.flush()).await?;
            metrics::frames_sent(count);
        }
    }

    async fn read_loop<R>(&self, reader: &mut SecureReader<R>) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let read_timeout = self.config.read_timeout();
        let mut buf = Vec::with_capacity(self.limits.max_read_plaintext + TAG_LEN);

        loop {
            let frame =
                with_deadline(read_timeout, TimeoutKind::Read, reader.read_frame(&mut buf)).await?;
            let Some(frame) = frame else {
                tracing::debug!(connection_id = %self.id, "Peer closed the stream");
                return Ok(());
            };
            metrics::frame_received();
            self.dispatch(frame).await?;
        }
    }

    async fn dispatch(&self, frame: Frame<'_>) -> Result<()> {
        if frame.is_message() {
            self.inbound.on_message(frame.payload).await;
            return Ok(());
        }

        let pending = self.lock().requests.remove(&frame.seq);
        if let Some(request) = pending {
            return request.resolve(frame.seq, frame.payload).map_err(Error::from);
        }

        let Some(reply) = self.inbound.on_request(frame.payload).await else {
            return Ok(());
        };
        if let Err(e) = frame::check_payload_len(reply.len(), self.limits.max_write_plaintext) {
            tracing::warn!(connection_id = %self.id, seq = frame.seq, error = %e, "Dropping reply");
            return Ok(());
        }
        if let Err(e) = self.push(PendingWrite::from_vec(frame.seq, reply)) {
            tracing::debug!(connection_id = %self.id, seq = frame.seq, error = %e, "Dropping reply");
        }
        Ok(())
    }

    #[cfg(test)]
    fn queued_writes(&self) -> usize {
        self.lock().queue.len()
    }
}

impl<I> Conn<I> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A request's slot in the table, released when the caller stops waiting.
struct InFlight<'a, I> {
    conn: &'a Conn<I>,
    seq: u32,
    rx: oneshot::Receiver<Result<Vec<u8>>>,
}

impl<I> Drop for InFlight<'_, I> {
    fn drop(&mut self) {
        // Closing first means an entry that still has a live receiver belongs
        // to a newer request on the same sequence number.
        self.rx.close();
        let mut state = self.conn.lock();
        if state
            .requests
            .get(&self.seq)
            .is_some_and(PendingRequest::is_abandoned)
        {
            state.requests.remove(&self.seq);
        }
    }
}
