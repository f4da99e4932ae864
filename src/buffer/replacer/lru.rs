//! LRU (Least Recently Used) replacement policy.

use std::collections::{BTreeMap, HashMap};

use super::{EvictionPolicy, Replacer};
use crate::common::FrameId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_access: u64,
    evictable: bool,
}

/// Evicts the evictable frame with the oldest last-access timestamp.
///
/// Timestamps come from a logical clock, so the victim depends only on the
/// access trace. Evictable frames are additionally kept in a map ordered by
/// timestamp; touching a frame moves one key and victim lookup takes the
/// first key.
pub struct LruReplacer {
    current_timestamp: u64,
    entries: HashMap<FrameId, Entry>,
    /// Evictable frames keyed by last access (timestamps are unique).
    by_age: BTreeMap<u64, FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            current_timestamp: 0,
            entries: HashMap::new(),
            by_age: BTreeMap::new(),
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.current_timestamp += 1;
        let now = self.current_timestamp;

        let entry = self.entries.entry(frame_id).or_insert(Entry {
            last_access: now,
            evictable: false,
        });
        if entry.evictable {
            self.by_age.remove(&entry.last_access);
            self.by_age.insert(now, frame_id);
        }
        entry.last_access = now;
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let Some(entry) = self.entries.get_mut(&frame_id) else {
            return;
        };
        if entry.evictable == evictable {
            return;
        }
        entry.evictable = evictable;
        if evictable {
            self.by_age.insert(entry.last_access, frame_id);
        } else {
            self.by_age.remove(&entry.last_access);
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.by_age.pop_first()?;
        self.entries.remove(&frame_id);
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(entry) = self.entries.remove(&frame_id) {
            if entry.evictable {
                self.by_age.remove(&entry.last_access);
            }
        }
    }

    fn size(&self) -> usize {
        self.by_age.len()
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lru
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
