//! Carriers for queued writes and in-flight requests.

use tokio::sync::oneshot;

use crate::error::{Error, FramingError, Result};
use crate::rpc::pool::{Pool, Recycle};

/// Largest buffer a recycled `PendingWrite` keeps.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Process-wide free list of write carriers.
pub(crate) static PENDING_WRITES: Pool<PendingWrite> = Pool::new(1024);

/// An outbound payload waiting for the writer loop.
///
/// Ownership moves caller → queue → writer loop → pool.
#[derive(Debug, Default)]
pub struct PendingWrite {
    pub(crate) seq: u32,
    pub(crate) buf: Vec<u8>,
    waiter: Option<oneshot::Sender<bool>>,
}

impl PendingWrite {
    /// Copy `payload` into a pooled carrier. With `wait`, also returns the
    /// receiver that learns whether the frame was handed to the stream.
    pub(crate) fn acquire(
        seq: u32,
        payload: &[u8],
        wait: bool,
    ) -> (Self, Option<oneshot::Receiver<bool>>) {
        let mut pending = PENDING_WRITES.acquire();
        pending.seq = seq;
        pending.buf.extend_from_slice(payload);
        let rx = wait.then(|| {
            let (tx, rx) = oneshot::channel();
            pending.waiter = Some(tx);
            rx
        });
        (pending, rx)
    }

    /// Carrier around an already-owned buffer.
    pub(crate) fn from_vec(seq: u32, buf: Vec<u8>) -> Self {
        Self {
            seq,
            buf,
            waiter: None,
        }
    }

    /// Signal the waiter, if any, and return the carrier to the pool.
    pub(crate) fn complete(mut self, written: bool) {
        if let Some(tx) = self.waiter.take() {
            let _ = tx.send(written);
        }
        PENDING_WRITES.release(self);
    }
}

impl Recycle for PendingWrite {
    fn recycle(&mut self) -> bool {
        self.seq = 0;
        self.waiter = None;
        self.buf.clear();
        self.buf.capacity() <= MAX_RETAINED_CAPACITY
    }
}

/// One outstanding response-expecting request.
#[derive(Debug)]
pub struct PendingRequest {
    dst: Vec<u8>,
    tx: oneshot::Sender<Result<Vec<u8>>>,
}

impl PendingRequest {
    pub(crate) fn new(dst: Vec<u8>, tx: oneshot::Sender<Result<Vec<u8>>>) -> Self {
        Self { dst, tx }
    }

    /// Copy the response into the destination buffer and wake the caller.
    ///
    /// A response larger than the destination's capacity fails both the caller
    /// and, through the returned error, the connection.
    pub(crate) fn resolve(self, seq: u32, payload: &[u8]) -> Result<(), FramingError> {
        let Self { mut dst, tx } = self;
        if payload.len() > dst.capacity() {
            let err = FramingError::ResponseTooLarge {
                seq,
                len: payload.len(),
                capacity: dst.capacity(),
            };
            let _ = tx.send(Err(err.clone().into()));
            return Err(err);
        }
        dst.clear();
        dst.extend_from_slice(payload);
        let _ = tx.send(Ok(dst));
        Ok(())
    }

    pub(crate) fn fail(self, err: Error) {
        let _ = self.tx.send(Err(err));
    }

    /// The caller stopped waiting for this response.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiter_learns_outcome() {
        let (pending, rx) = PendingWrite::acquire(0, b"data", true);
        assert_eq!(pending.buf, b"data");
        pending.complete(true);
        assert!(rx.unwrap().await.unwrap());

        let (pending, rx) = PendingWrite::acquire(0, b"data", true);
        pending.complete(false);
        assert!(!rx.unwrap().await.unwrap());
    }

    #[test]
    fn no_wait_has_no_receiver() {
        let (pending, rx) = PendingWrite::acquire(7, b"x", false);
        assert!(rx.is_none());
        assert_eq!(pending.seq, 7);
        pending.complete(true);
    }

    #[tokio::test]
    async fn resolve_fills_destination() {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest::new(Vec::with_capacity(16), tx);
        request.resolve(4, b"reply").unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), b"reply");
    }

    #[tokio::test]
    async fn resolve_rejects_oversized_response() {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest::new(Vec::with_capacity(2), tx);
        let err = request.resolve(4, b"too long").unwrap_err();
        assert!(matches!(err, FramingError::ResponseTooLarge { seq: 4, len: 8, .. }));
        assert!(matches!(
            rx.await.unwrap(),
            Err(Error::Framing(FramingError::ResponseTooLarge { .. }))
        ));
    }

    #[test]
    fn closed_receiver_marks_request_abandoned() {
        let (tx, mut rx) = oneshot::channel();
        let request = PendingRequest::new(Vec::new(), tx);
        assert!(!request.is_abandoned());
        rx.close();
        assert!(request.is_abandoned());
    }
}
