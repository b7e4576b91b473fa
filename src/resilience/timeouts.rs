//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap handshakes, admission waits and per-frame I/O with a deadline
//! - Map expiry to a typed `Error::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timer wheel replaces pooled timers
//! - Expiry drops the inner future, which closes any stream it owns

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result, TimeoutKind};

/// Run `fut` under an optional deadline.
pub async fn with_deadline<F, T>(limit: Option<Duration>, kind: TimeoutKind, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(kind))?,
        None => fut.await,
    }
}
