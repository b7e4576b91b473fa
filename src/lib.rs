//! Encrypted, multiplexed RPC transport over TCP.
//!
//! ```text
//!  Client::connect ──TCP──▶ Server::serve
//!        │                      │ admission slot
//!        ▼                      ▼
//!  ClientHandshaker ◀─X25519─▶ ServerHandshaker
//!        │                      │
//!        ▼                      ▼
//!   SecureStream            SecureStream      len || AEAD(seq || payload)
//!        │                      │
//!        ▼                      ▼
//!      Conn  ◀── frames ──▶   Conn  ──▶ Inbound
//! ```

// Wire format and channel
pub mod net;
pub mod protocol;

// Engine, server, client
pub mod client;
pub mod rpc;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use client::{Client, ClientConn};
pub use config::MonteConfig;
pub use error::{Error, Result};
pub use lifecycle::Shutdown;
pub use rpc::{Conn, Echo, Inbound};
pub use server::Server;
