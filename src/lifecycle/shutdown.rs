//! Shutdown coordination.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Wraps a watch channel that every long-running task can subscribe to.
/// Triggering is idempotent.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Trigger the shutdown signal. Returns `false` if it was already triggered.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| !std::mem::replace(fired, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl ShutdownSignal {
    /// A signal that never fires. For connections driven outside a server.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once shutdown has been triggered, or the coordinator dropped.
    pub async fn cancelled(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                let _ = rx.wait_for(|fired| *fired).await;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscribers_see_trigger() {
        let shutdown = Shutdown::new();
        assert!(shutdown.trigger());

        let mut signal = shutdown.subscribe();
        assert!(signal.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let waiter = tokio::spawn(async move { signal.cancelled().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        let fired = tokio::time::timeout(Duration::from_millis(30), signal.cancelled()).await;
        assert!(fired.is_err());
    }
}
