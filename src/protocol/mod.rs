//! Wire protocol.
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     (seq, payload) → frame.rs (plaintext = seq || payload)
//!     → net::secure (encrypt) → length || ciphertext
//!
//! Inbound:
//!     length || ciphertext → net::secure (bounds check, decrypt)
//!     → frame.rs (split seq || payload) → rpc::conn dispatch
//! ```
//!
//! # Design Decisions
//! - Pure format: no state lives here apart from the sequence counter type
//! - Big-endian integers everywhere
//! - Sequence 0 is reserved for fire-and-forget messages

pub mod frame;
pub mod sequence;

pub use frame::Frame;
pub use sequence::SequenceCounter;
