//! Resilience subsystem.
//!
//! # Design Decisions
//! - Every deadline goes through one helper so timeout errors are uniform
//! - A deadline of `None` means "no deadline", never "expire immediately"

pub mod timeouts;

pub use timeouts::with_deadline;
