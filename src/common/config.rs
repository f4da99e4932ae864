//! Configuration for kerneldb.
//!
//! Compile-time constants fix the on-disk format; [`DatabaseConfig`] holds the
//! knobs chosen when a database is opened.

use crate::buffer::replacer::EvictionPolicy;

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems and the persisted layout:
/// every page, including the bootstrap catalog page, is exactly this long.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages with u32 PageId (the last id is the sentinel).
pub const MAX_PAGES: u64 = u32::MAX as u64;

/// Number of frames used when no pool size is configured.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Runtime configuration consumed by [`crate::Database::open`].
///
/// # Example
/// ```
/// use kerneldb::{DatabaseConfig, EvictionPolicy};
///
/// let config = DatabaseConfig::default()
///     .with_pool_size(16)
///     .with_eviction_policy(EvictionPolicy::Clock)
///     .with_prefetch(false);
/// assert_eq!(config.pool_size, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// Replacement policy used when the pool is full.
    pub eviction_policy: EvictionPolicy,
    /// Load the next page of a sequential scan ahead of time.
    pub prefetch: bool,
}

impl DatabaseConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            eviction_policy: EvictionPolicy::Lru,
            prefetch: true,
        }
    }
}
