//! FIFO (First-In-First-Out) replacement policy.

use std::collections::{HashSet, VecDeque};

use crate::common::FrameId;

/// Evicts frames in the order they became candidates.
///
/// A frame is queued when it is first accessed and re-queued when it is
/// released after having been dropped from the queue. Pinned frames are
/// skipped during eviction.
#[derive(Debug, Default)]
pub struct FifoReplacer {
    /// Queue of frame IDs in insertion order (front = oldest).
    queue: VecDeque<FrameId>,

    /// Set for O(1) membership check.
    in_queue: HashSet<FrameId>,

    /// Frames that are currently evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl FifoReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame if it is not already queued. Re-access does not reorder.
    pub fn record_access(&mut self, frame_id: FrameId) {
        if self.in_queue.insert(frame_id) {
            self.queue.push_back(frame_id);
        }
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Returns the oldest evictable frame, or None if all frames are pinned.
    pub fn evict(&mut self) -> Option<FrameId> {
        while let Some(frame_id) = self.queue.pop_front() {
            self.in_queue.remove(&frame_id);
            if self.evictable.remove(&frame_id) {
                return Some(frame_id);
            }
        }
        None
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}
