//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, classify accept errors)
//!     → server admission (slot reserved)
//!     → handshake.rs (X25519 exchange under a deadline)
//!     → secure.rs (authenticated-encrypted framed stream)
//!     → Hand off to rpc::Conn
//!
//! Connection States:
//!     Accepting → Handshaking → Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Admission happens before the handshake
//! - Each connection tracked for graceful shutdown
//! - Encryption is mandatory; there is no plaintext mode

pub mod connection;
pub mod handshake;
pub mod listener;
pub mod secure;

pub use handshake::{ClientHandshaker, Handshaker, ServerHandshaker};
pub use listener::Accept;
pub use secure::{FrameLimits, Role, SecureReader, SecureStream, SecureWriter, SessionKey};
