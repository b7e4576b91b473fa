//! Connection engine and its collaborators.
//!
//! # Data Flow
//! ```text
//! caller ──write/request──▶ Conn (conn.rs) ──▶ SecureWriter
//!                            │   carriers from pending.rs, recycled via pool.rs
//!                            ▼
//! SecureReader ──▶ Conn read loop ──▶ pending request | Inbound (handler.rs)
//! ```
//!
//! # Design Decisions
//! - Application code plugs in through `Inbound`; servers through `Handler`
//! - Write carriers come from one process-wide pool with single-owner handoff

pub mod conn;
pub mod handler;
pub mod pending;
pub mod pool;

pub use conn::{Conn, Phase};
pub use handler::{Echo, Handler, Inbound, Service};
