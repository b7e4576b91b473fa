//! Admission control.
//!
//! # Responsibilities
//! - Bound concurrently handled connections with a fixed pool of slots
//! - Try a slot without waiting, then wait up to a deadline
//! - Let shutdown preempt the wait
//!
//! # Design Decisions
//! - Slots are owned semaphore permits, released on drop even if the
//!   connection task panics
//! - Shared by server and client; each owns its own pool

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{Error, Result, TimeoutKind};
use crate::lifecycle::ShutdownSignal;

/// Fixed pool of connection slots.
#[derive(Debug, Clone)]
pub struct Admission {
    slots: Arc<Semaphore>,
    max: usize,
    wait: Duration,
}

impl Admission {
    pub fn new(max: usize, wait: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max)),
            max,
            wait,
        }
    }

    /// Reserve one slot.
    ///
    /// Fails with [`Error::Shutdown`] once `shutdown` fires and with
    /// [`Error::Timeout`] if no slot frees within the configured wait.
    pub async fn reserve(&self, shutdown: &mut ShutdownSignal) -> Result<AdmissionPermit> {
        if shutdown.is_triggered() {
            return Err(Error::Shutdown);
        }

        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => return Ok(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::Closed) => return Err(Error::Shutdown),
            Err(TryAcquireError::NoPermits) => {}
        }

        tracing::debug!(
            max_connections = self.max,
            wait_ms = self.wait.as_millis() as u64,
            "All connection slots busy, waiting"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Error::Shutdown),
            acquired = tokio::time::timeout(self.wait, Arc::clone(&self.slots).acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(AdmissionPermit { _permit: permit }),
                    Ok(Err(_)) => Err(Error::Shutdown),
                    Err(_) => Err(Error::Timeout(TimeoutKind::Admission)),
                }
            }
        }
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// A reserved connection slot.
///
/// When dropped, the slot is released back to the pool.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    #[tokio::test]
    async fn free_slot_is_immediate() {
        let admission = Admission::new(2, Duration::from_secs(10));
        let mut signal = ShutdownSignal::never();

        let first = admission.reserve(&mut signal).await.unwrap();
        let _second = admission.reserve(&mut signal).await.unwrap();
        assert_eq!(admission.available(), 0);

        drop(first);
        assert_eq!(admission.available(), 1);
    }

    #[tokio::test]
    async fn full_pool_times_out() {
        let admission = Admission::new(1, Duration::from_millis(30));
        let mut signal = ShutdownSignal::never();
        let _held = admission.reserve(&mut signal).await.unwrap();

        let err = admission.reserve(&mut signal).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(TimeoutKind::Admission)));
    }

    #[tokio::test]
    async fn waiter_gets_released_slot() {
        let admission = Admission::new(1, Duration::from_secs(5));
        let mut signal = ShutdownSignal::never();
        let held = admission.reserve(&mut signal).await.unwrap();

        let waiter = {
            let admission = admission.clone();
            tokio::spawn(async move {
                let mut signal = ShutdownSignal::never();
                admission.reserve(&mut signal).await.map(drop)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_preempts_wait() {
        let admission = Admission::new(1, Duration::from_secs(30));
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let _held = admission.reserve(&mut signal).await.unwrap();

        let waiter = {
            let admission = admission.clone();
            let mut signal = shutdown.subscribe();
            tokio::spawn(async move { admission.reserve(&mut signal).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let err = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::Shutdown));

        // Already triggered: no slot is handed out even if one is free.
        let fresh = Admission::new(1, Duration::from_secs(1));
        assert!(matches!(
            fresh.reserve(&mut signal).await,
            Err(Error::Shutdown)
        ));
    }
}
