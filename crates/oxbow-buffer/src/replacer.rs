//! Page replacement policy for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock replacement algorithm.
///
/// Reference bits are atomic so access recording never takes a lock; only
/// the clock hand itself is protected. Whether a frame may be evicted at
/// all is decided by the caller through the predicate passed to `evict`
/// (the pool checks the frame's pin count there).
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer over the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits = (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Records that the given frame was accessed, giving it a second chance.
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    /// Selects a victim frame for eviction.
    ///
    /// `is_victim` decides whether a frame is currently evictable (unpinned
    /// and holding a page). Sweeps at most two full rotations, clearing
    /// reference bits along the way; falls back to any evictable frame if
    /// every candidate kept its second chance.
    pub fn evict<F>(&self, is_victim: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        if self.num_frames == 0 {
            return None;
        }

        let mut hand = self.clock_hand.lock();

        for _ in 0..(2 * self.num_frames) {
            let frame_id = FrameId(*hand as u32);
            *hand = (*hand + 1) % self.num_frames;

            if is_victim(frame_id) {
                let idx = frame_id.0 as usize;
                if self.reference_bits[idx].load(Ordering::Relaxed) {
                    self.reference_bits[idx].store(false, Ordering::Relaxed);
                } else {
                    return Some(frame_id);
                }
            }
        }

        // Every candidate was re-referenced during the sweep; take the first
        // one still evictable.
        (0..self.num_frames)
            .map(|i| FrameId(i as u32))
            .find(|&fid| is_victim(fid))
    }

    /// Forgets a frame's access history (used when a frame returns to the
    /// free list).
    pub fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_replacer_new() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
    }

    #[test]
    fn test_clock_replacer_evict_none_evictable() {
        let replacer = ClockReplacer::new(10);
        assert!(replacer.evict(|_| false).is_none());
    }

    #[test]
    fn test_clock_replacer_evict_single() {
        let replacer = ClockReplacer::new(10);

        let victim = replacer.evict(|fid| fid == FrameId(5));
        assert_eq!(victim, Some(FrameId(5)));
    }

    #[test]
    fn test_clock_replacer_second_chance() {
        let replacer = ClockReplacer::new(3);

        // Frames 0 and 1 were recently accessed, 2 was not.
        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        let victim = replacer.evict(|_| true);
        assert_eq!(victim, Some(FrameId(2)));
    }

    #[test]
    fn test_clock_replacer_clears_reference_bits() {
        let replacer = ClockReplacer::new(2);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        // All referenced: sweep clears bits and still finds a victim.
        let victim = replacer.evict(|_| true);
        assert!(victim.is_some());
    }

    #[test]
    fn test_clock_replacer_respects_predicate() {
        let replacer = ClockReplacer::new(4);

        // Only frame 3 is evictable (others "pinned").
        for _ in 0..3 {
            let victim = replacer.evict(|fid| fid == FrameId(3));
            assert_eq!(victim, Some(FrameId(3)));
        }
    }

    #[test]
    fn test_clock_replacer_remove_clears_bit() {
        let replacer = ClockReplacer::new(2);

        replacer.record_access(FrameId(0));
        replacer.remove(FrameId(0));

        // Frame 0 lost its second chance.
        let victim = replacer.evict(|fid| fid == FrameId(0));
        assert_eq!(victim, Some(FrameId(0)));
    }

    #[test]
    fn test_clock_replacer_out_of_bounds() {
        let replacer = ClockReplacer::new(5);

        // Should not panic.
        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));
    }

    #[test]
    fn test_clock_replacer_empty() {
        let replacer = ClockReplacer::new(0);
        assert!(replacer.evict(|_| true).is_none());
    }
}
