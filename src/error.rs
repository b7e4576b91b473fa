//! Error taxonomy for connections, handshakes and the server.
//!
//! # Design Decisions
//! - A single crate-level `Error` so callers match on what went wrong, not where
//! - Framing and crypto failures carry enough context to log, never key material
//! - I/O errors pass through untouched

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by connections, handshakes and the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Write attempted after the connection began graceful shutdown.
    #[error("connection is shutting down")]
    Shutdown,

    /// The connection ended before the operation could complete.
    #[error("connection closed")]
    Closed,

    /// A deadline expired.
    #[error("{0} timed out")]
    Timeout(TimeoutKind),

    /// Length, sequence or size violation on the wire.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Key exchange or authentication failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Underlying network I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Handshake,
    Admission,
    Request,
    Read,
    Write,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutKind::Handshake => "handshake",
            TimeoutKind::Admission => "admission wait",
            TimeoutKind::Request => "request",
            TimeoutKind::Read => "read",
            TimeoutKind::Write => "write",
        };
        f.write_str(name)
    }
}

/// Wire-format violations. Any of these tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// Declared ciphertext length is larger than the read buffer allows.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Declared ciphertext length cannot hold a tag and a sequence number.
    #[error("frame of {len} bytes is shorter than the minimum {min}")]
    FrameTooShort { len: usize, min: usize },

    /// Outbound payload does not fit the configured write buffer.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// A response does not fit its request's destination buffer.
    #[error("response for seq {seq} is {len} bytes, destination holds {capacity}")]
    ResponseTooLarge { seq: u32, len: usize, capacity: usize },
}

/// Handshake and channel-authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The peer's public key produced an all-zero shared secret.
    #[error("peer public key is a low-order point")]
    NonContributory,

    /// Key derivation rejected its parameters.
    #[error("key derivation failed")]
    KeyDerivation,

    /// Ciphertext failed authentication.
    #[error("frame failed authentication")]
    Authentication,

    /// The per-direction nonce counter would wrap.
    #[error("nonce counter exhausted")]
    NonceExhausted,
}
