//! FIFO (First-In-First-Out) replacement policy.

use std::collections::{BTreeMap, HashMap};

use super::{EvictionPolicy, Replacer};
use crate::common::FrameId;

#[derive(Debug, Clone, Copy)]
struct Admission {
    seq: u64,
    evictable: bool,
}

/// Evicts the evictable frame that entered the pool first.
///
/// A frame's position is fixed when it is admitted; hits do not move it.
/// A frame that is evicted or removed and comes back queues at the end.
pub struct FifoReplacer {
    next_seq: u64,
    admitted: HashMap<FrameId, Admission>,
    /// Evictable frames by admission order.
    queue: BTreeMap<u64, FrameId>,
}

impl FifoReplacer {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            admitted: HashMap::new(),
            queue: BTreeMap::new(),
        }
    }
}

impl Replacer for FifoReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if self.admitted.contains_key(&frame_id) {
            return;
        }
        self.admitted.insert(
            frame_id,
            Admission {
                seq: self.next_seq,
                evictable: false,
            },
        );
        self.next_seq += 1;
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let Some(admission) = self.admitted.get_mut(&frame_id) else {
            return;
        };
        if admission.evictable == evictable {
            return;
        }
        admission.evictable = evictable;
        if evictable {
            self.queue.insert(admission.seq, frame_id);
        } else {
            self.queue.remove(&admission.seq);
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.queue.pop_first()?;
        self.admitted.remove(&frame_id);
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(admission) = self.admitted.remove(&frame_id) {
            if admission.evictable {
                self.queue.remove(&admission.seq);
            }
        }
    }

    fn size(&self) -> usize {
        self.queue.len()
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Fifo
    }
}

impl Default for FifoReplacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit(replacer: &mut FifoReplacer, ids: &[usize]) {
        for &id in ids {
            replacer.record_access(FrameId::new(id));
        }
    }

    fn unpin(replacer: &mut FifoReplacer, ids: &[usize]) {
        for &id in ids {
            replacer.set_evictable(FrameId::new(id), true);
        }
    }

    #[test]
    fn test_victims_in_admission_order() {
        let mut replacer = FifoReplacer::new();
        admit(&mut replacer, &[2, 0, 1]);
        unpin(&mut replacer, &[0, 1, 2]);
        assert_eq!(replacer.size(), 3);

        let victims: Vec<_> = std::iter::from_fn(|| replacer.evict()).collect();
        assert_eq!(victims, vec![FrameId::new(2), FrameId::new(0), FrameId::new(1)]);
    }

    #[test]
    fn test_hits_do_not_reorder() {
        let mut replacer = FifoReplacer::new();
        admit(&mut replacer, &[0, 1, 0, 0]);
        unpin(&mut replacer, &[1, 0]);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_pinned_frame_keeps_its_place() {
        let mut replacer = FifoReplacer::new();
        admit(&mut replacer, &[0, 1, 2]);
        unpin(&mut replacer, &[1]);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);

        unpin(&mut replacer, &[2, 0]);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_readmitted_frame_queues_last() {
        let mut replacer = FifoReplacer::new();
        admit(&mut replacer, &[0, 1]);
        replacer.remove(FrameId::new(0));
        admit(&mut replacer, &[0]);
        unpin(&mut replacer, &[0, 1]);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_repinning_withdraws_candidate() {
        let mut replacer = FifoReplacer::new();
        admit(&mut replacer, &[4]);
        unpin(&mut replacer, &[4]);
        replacer.set_evictable(FrameId::new(4), false);
        assert_eq!(replacer.size(), 0);

        // Never admitted: ignored.
        replacer.set_evictable(FrameId::new(9), true);
        assert_eq!(replacer.evict(), None);
    }
}
