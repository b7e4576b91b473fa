//! Per-connection sequence numbers.

use super::frame::NO_RESPONSE;

/// Monotonic sequence counter that skips the reserved value 0.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_after(last: u32) -> Self {
        Self { last }
    }

    /// Next nonzero sequence number, wrapping past `u32::MAX` to 1.
    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        if self.last == NO_RESPONSE {
            self.last = 1;
        }
        self.last
    }
}
