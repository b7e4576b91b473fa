//! Free-list pools for per-operation carriers.
//!
//! A pooled value has exactly one owner at a time: `acquire` moves it out of
//! the free list and `release` moves it back. Nothing is shared while in use.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A value that can be reset for reuse.
pub trait Recycle: Default {
    /// Clear all per-use state. Return `false` to drop the value instead of
    /// keeping it (for example, when it grew too large).
    fn recycle(&mut self) -> bool;
}

/// Bounded free list.
#[derive(Debug)]
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> Pool<T> {
    /// Pool that retains at most `capacity` idle values.
    pub const fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Number of idle values currently held.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Recycle> Pool<T> {
    /// Take an idle value, or a fresh default one if none is available.
    pub fn acquire(&self) -> T {
        self.lock().pop().unwrap_or_default()
    }

    /// Reset `item` and return it to the free list.
    pub fn release(&self, mut item: T) {
        if !item.recycle() {
            return;
        }
        let mut free = self.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }
}
