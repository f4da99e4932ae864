//! CLOCK (second chance) replacement policy.

use super::{EvictionPolicy, Replacer};
use crate::common::FrameId;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    tracked: bool,
    evictable: bool,
    reference: bool,
}

/// Circular scan over frames with one reference bit each.
///
/// Every access sets the frame's bit. The hand clears set bits as it passes
/// and evicts the first evictable frame whose bit is already clear, so a
/// recently used frame survives exactly one sweep.
pub struct ClockReplacer {
    slots: Vec<Slot>,
    hand: usize,
    evictable_count: usize,
}

impl ClockReplacer {
    /// Create a ring for `capacity` frames. The ring grows if a larger frame
    /// id is ever seen.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            hand: 0,
            evictable_count: 0,
        }
    }

    fn slot_mut(&mut self, frame_id: FrameId) -> &mut Slot {
        if frame_id.0 >= self.slots.len() {
            self.slots.resize(frame_id.0 + 1, Slot::default());
        }
        &mut self.slots[frame_id.0]
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        let slot = self.slot_mut(frame_id);
        slot.tracked = true;
        slot.reference = true;
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let Some(slot) = self.slots.get_mut(frame_id.0) else {
            return;
        };
        if !slot.tracked || slot.evictable == evictable {
            return;
        }
        slot.evictable = evictable;
        if evictable {
            self.evictable_count += 1;
        } else {
            self.evictable_count -= 1;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.evictable_count == 0 {
            return None;
        }

        // Two sweeps suffice: the first clears every bit it passes.
        let len = self.slots.len();
        for _ in 0..2 * len {
            let index = self.hand;
            self.hand = (self.hand + 1) % len;

            let slot = &mut self.slots[index];
            if !slot.tracked || !slot.evictable {
                continue;
            }
            if slot.reference {
                slot.reference = false;
                continue;
            }
            *slot = Slot::default();
            self.evictable_count -= 1;
            return Some(FrameId::new(index));
        }
        None
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(slot) = self.slots.get_mut(frame_id.0) {
            if slot.tracked && slot.evictable {
                self.evictable_count -= 1;
            }
            *slot = Slot::default();
        }
    }

    fn size(&self) -> usize {
        self.evictable_count
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Clock
    }
}
