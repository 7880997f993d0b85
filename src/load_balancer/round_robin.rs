//! Round-robin backend selection.

use std::sync::atomic::{AtomicU32, Ordering};

/// Round-robin selector.
/// One counter is shared by every route; it wraps on overflow and is never reset.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn starting_at(value: u32) -> Self {
        Self {
            counter: AtomicU32::new(value),
        }
    }

    /// Index of the next backend out of `backend_count`.
    pub fn next(&self, backend_count: usize) -> Option<usize> {
        if backend_count == 0 {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(count as usize % backend_count)
    }

    /// Pick the next backend from `backends`.
    pub fn select<'a, T>(&self, backends: &'a [T]) -> Option<&'a T> {
        self.next(backends.len()).and_then(|index| backends.get(index))
    }
}
