//! Paged file statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`PagedFile`](crate::buffer::PagedFile).
///
/// All fields are atomic for lock-free, thread-safe updates.
///
/// # Memory Ordering
/// Every counter uses `Ordering::Relaxed`: each one only needs atomicity,
/// and no decision is ever made by comparing two counters.
#[derive(Debug, Default)]
pub struct PagedFileStats {
    /// Cursor bindings served from a frame already holding the page.
    pub hits: AtomicU64,

    /// Cursor bindings that had to read the page through the swapper.
    pub faults: AtomicU64,

    /// Pages removed from the pool to make room.
    pub evictions: AtomicU64,

    /// Dirty pages written back through the swapper.
    pub flushes: AtomicU64,
}

impl PagedFileStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a non-atomic copy for display/logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of [`PagedFileStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub faults: u64,
    pub evictions: u64,
    pub flushes: u64,
}

impl StatsSnapshot {
    /// Fraction of bindings served without I/O (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.faults;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, faults: {}, evictions: {}, flushes: {}, hit_rate: {:.2}% }}",
            self.hits,
            self.faults,
            self.evictions,
            self.flushes,
            self.hit_rate() * 100.0
        )
    }
}
