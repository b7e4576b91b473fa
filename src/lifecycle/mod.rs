//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → accept loop stops → admission waits abort
//!     → every Conn::handle drains its writer and closes
//!     → server join returns once the tracker is idle
//!
//! Signals (signals.rs):
//!     SIGINT / SIGTERM → wait_for_signal() resolves → Server::shutdown()
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative, observed at loop boundaries
//! - The signal is level-triggered: subscribing after the trigger still sees it

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
