//! Eviction policy implementations (replacers).
//!
//! The [`BufferPoolManager`](crate::buffer::BufferPoolManager) only talks to
//! the [`Replacer`] trait. Each policy keeps just the bookkeeping it needs:
//! - [`LruReplacer`] - last-access timestamps
//! - [`FifoReplacer`] - admission queue
//! - [`ClockReplacer`] - reference-bit ring
//! - [`LfuReplacer`] - access-frequency counters
//!
//! All policies share the same contract: a frame is a victim candidate only
//! while it is both tracked (seen by `record_access`) and evictable.

mod clock;
mod fifo;
mod lfu;
mod lru;

use std::fmt;

use crate::common::FrameId;

pub use clock::ClockReplacer;
pub use fifo::FifoReplacer;
pub use lfu::LfuReplacer;
pub use lru::LruReplacer;

/// Victim selection capability of the buffer pool.
pub trait Replacer: Send {
    /// Record that a frame was accessed (loaded or hit).
    fn record_access(&mut self, frame_id: FrameId);

    /// Mark a frame as evictable (pin_count == 0) or not.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Choose a victim and stop tracking it.
    ///
    /// Returns `None` if no tracked frame is evictable.
    fn evict(&mut self) -> Option<FrameId>;

    /// Forget a frame entirely (its page was deleted from the pool).
    fn remove(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;

    /// Which policy this replacer implements.
    fn policy(&self) -> EvictionPolicy;
}

/// The available eviction policies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    /// Least recently used.
    #[default]
    Lru,
    /// First in, first out.
    Fifo,
    /// Second chance over a reference-bit ring.
    Clock,
    /// Least frequently used, oldest residency breaks ties.
    Lfu,
}

impl EvictionPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [EvictionPolicy; 4] = [
        EvictionPolicy::Lru,
        EvictionPolicy::Fifo,
        EvictionPolicy::Clock,
        EvictionPolicy::Lfu,
    ];

    /// Build an empty replacer for a pool of `capacity` frames.
    pub fn build(self, capacity: usize) -> Box<dyn Replacer> {
        match self {
            EvictionPolicy::Lru => Box::new(LruReplacer::new()),
            EvictionPolicy::Fifo => Box::new(FifoReplacer::new()),
            EvictionPolicy::Clock => Box::new(ClockReplacer::new(capacity)),
            EvictionPolicy::Lfu => Box::new(LfuReplacer::new()),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Clock => "CLOCK",
            EvictionPolicy::Lfu => "LFU",
        };
        f.write_str(name)
    }
}
