//! Buffer pool statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the buffer pool.
///
/// Counters only ever increase; outside the crate they are read-only.
///
/// # Memory Ordering
/// `Ordering::Relaxed` everywhere: each counter only needs atomicity, and no
/// reader relies on ordering between different counters.
///
/// # Example
/// ```
/// use kerneldb::BufferPoolStats;
///
/// let stats = BufferPoolStats::new();
/// assert_eq!(stats.cache_hits(), 0);
/// assert_eq!(stats.snapshot().hit_rate(), 0.0);
/// ```
#[derive(Debug, Default)]
pub struct BufferPoolStats {
    /// Page found in the buffer pool.
    pub(crate) cache_hits: AtomicU64,

    /// Page had to be loaded from disk on demand.
    pub(crate) cache_misses: AtomicU64,

    /// A resident page was evicted to make room.
    pub(crate) evictions: AtomicU64,

    /// Pages read from disk, including prefetches.
    pub(crate) pages_read: AtomicU64,

    /// Pages written back to disk.
    pub(crate) pages_written: AtomicU64,

    /// Pages loaded ahead of a sequential scan.
    pub(crate) prefetches: AtomicU64,
}

impl BufferPoolStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read.load(Ordering::Relaxed)
    }

    pub fn pages_written(&self) -> u64 {
        self.pages_written.load(Ordering::Relaxed)
    }

    pub fn prefetches(&self) -> u64 {
        self.prefetches.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter into a plain value for display or comparison.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            evictions: self.evictions(),
            pages_read: self.pages_read(),
            pages_written: self.pages_written(),
            prefetches: self.prefetches(),
        }
    }
}

/// A point-in-time snapshot of buffer pool statistics.
///
/// # Example
/// ```
/// use kerneldb::BufferPoolStats;
///
/// let snapshot = BufferPoolStats::new().snapshot();
/// println!("{}", snapshot);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
    pub prefetches: u64,
}

impl StatsSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Counter deltas since an earlier snapshot.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits - earlier.cache_hits,
            cache_misses: self.cache_misses - earlier.cache_misses,
            evictions: self.evictions - earlier.evictions,
            pages_read: self.pages_read - earlier.pages_read,
            pages_written: self.pages_written - earlier.pages_written,
            prefetches: self.prefetches - earlier.prefetches,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, evictions: {}, reads: {}, writes: {}, \
             prefetches: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.evictions,
            self.pages_read,
            self.pages_written,
            self.prefetches,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = BufferPoolStats::new();
        assert_eq!(stats.cache_hits(), 0);
        assert_eq!(stats.cache_misses(), 0);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = BufferPoolStats::new();
        for _ in 0..7 {
            BufferPoolStats::bump(&stats.cache_hits);
        }
        for _ in 0..3 {
            BufferPoolStats::bump(&stats.cache_misses);
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 7);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.hit_rate(), 0.7);
    }

    #[test]
    fn test_snapshot_delta() {
        let stats = BufferPoolStats::new();
        BufferPoolStats::bump(&stats.pages_written);
        let before = stats.snapshot();
        BufferPoolStats::bump(&stats.pages_written);
        BufferPoolStats::bump(&stats.prefetches);

        let delta = stats.snapshot().since(&before);
        assert_eq!(delta.pages_written, 1);
        assert_eq!(delta.prefetches, 1);
        assert_eq!(delta.cache_hits, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = BufferPoolStats::new();
        for _ in 0..4 {
            BufferPoolStats::bump(&stats.cache_hits);
        }
        BufferPoolStats::bump(&stats.cache_misses);
        BufferPoolStats::bump(&stats.evictions);

        let display = stats.snapshot().to_string();
        assert!(display.contains("hits: 4"));
        assert!(display.contains("misses: 1"));
        assert!(display.contains("evictions: 1"));
        assert!(display.contains("80.00%"));
    }
}
