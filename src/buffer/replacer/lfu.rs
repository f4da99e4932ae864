//! LFU (Least Frequently Used) replacement policy.

use std::collections::{BTreeSet, HashMap};

use super::{EvictionPolicy, Replacer};
use crate::common::FrameId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    frequency: u64,
    /// Admission tick; smaller means resident longer.
    admitted: u64,
    evictable: bool,
}

impl Entry {
    fn key(&self, frame_id: FrameId) -> (u64, u64, FrameId) {
        (self.frequency, self.admitted, frame_id)
    }
}

/// Evicts the evictable frame with the lowest access count.
///
/// Ties go to the frame admitted earliest. A frame's count restarts when it
/// is evicted or removed.
pub struct LfuReplacer {
    next_tick: u64,
    entries: HashMap<FrameId, Entry>,
    /// Evictable frames ordered by (frequency, admission tick).
    candidates: BTreeSet<(u64, u64, FrameId)>,
}

impl LfuReplacer {
    pub fn new() -> Self {
        Self {
            next_tick: 0,
            entries: HashMap::new(),
            candidates: BTreeSet::new(),
        }
    }

    /// Access count of a tracked frame.
    pub fn frequency(&self, frame_id: FrameId) -> Option<u64> {
        self.entries.get(&frame_id).map(|entry| entry.frequency)
    }
}

impl Replacer for LfuReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        let tick = self.next_tick;
        let entry = self.entries.entry(frame_id).or_insert_with(|| Entry {
            frequency: 0,
            admitted: tick,
            evictable: false,
        });
        if entry.frequency == 0 {
            self.next_tick += 1;
        }

        if entry.evictable {
            self.candidates.remove(&entry.key(frame_id));
        }
        entry.frequency += 1;
        if entry.evictable {
            self.candidates.insert(entry.key(frame_id));
        }
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
            self.candidates.insert(entry.key(frame_id));
        } else {
            self.candidates.remove(&entry.key(frame_id));
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let (_, _, frame_id) = self.candidates.pop_first()?;
        self.entries.remove(&frame_id);
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(entry) = self.entries.remove(&frame_id) {
            if entry.evictable {
                self.candidates.remove(&entry.key(frame_id));
            }
        }
    }

    fn size(&self) -> usize {
        self.candidates.len()
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lfu
    }
}

impl Default for LfuReplacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(replacer: &mut LfuReplacer, id: usize) {
        replacer.record_access(FrameId::new(id));
        replacer.set_evictable(FrameId::new(id), true);
    }

    #[test]
    fn test_lfu_evicts_least_frequent() {
        let mut replacer = LfuReplacer::new();
        touch(&mut replacer, 0);
        touch(&mut replacer, 0);
        touch(&mut replacer, 1);
        touch(&mut replacer, 2);
        touch(&mut replacer, 2);

        assert_eq!(replacer.frequency(FrameId::new(0)), Some(2));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lfu_ties_go_to_oldest_resident() {
        let mut replacer = LfuReplacer::new();
        touch(&mut replacer, 2);
        touch(&mut replacer, 0);
        touch(&mut replacer, 1);

        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lfu_count_resets_after_eviction() {
        let mut replacer = LfuReplacer::new();
        for _ in 0..5 {
            touch(&mut replacer, 0);
        }
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.frequency(FrameId::new(0)), None);

        touch(&mut replacer, 1);
        touch(&mut replacer, 1);
        touch(&mut replacer, 0);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lfu_skips_pinned() {
        let mut replacer = LfuReplacer::new();
        replacer.record_access(FrameId::new(0));
        touch(&mut replacer, 1);
        touch(&mut replacer, 1);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }
}
