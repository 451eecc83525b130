//! Request identifier allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide source of request identifiers.
///
/// Local RPC calls and relayed requests draw from the same allocator, so two
/// requests in flight on the primary channel never carry the same id.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
