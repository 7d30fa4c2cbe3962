use hashlink::LinkedHashSet;
use parking_lot::Mutex;

use crate::common::config::FrameId;

/// LruReplacer tracks the frames of the buffer pool that are candidates for
/// eviction and picks victims in least-recently-unpinned order.
///
/// A frame enters the replacer when its pin count drops to zero
/// ([`LruReplacer::unpin`]) and leaves it when it is pinned again or evicted.
/// The ordered set keeps the oldest unpinned frame at the front; repeated
/// unpins of the same frame neither duplicate nor reorder it.
pub struct LruReplacer {
    inner: Mutex<LruReplacerInner>,
}

struct LruReplacerInner {
    /// Evictable frames, least recently unpinned at the front.
    lru: LinkedHashSet<FrameId>,
    /// Capacity; equals the buffer pool size.
    max_size: usize,
}

impl LruReplacer {
    /// Creates a replacer able to track up to `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruReplacerInner {
                lru: LinkedHashSet::new(),
                max_size: num_frames,
            }),
        }
    }

    /// Removes and returns the least recently unpinned frame, or `None` if no
    /// frame is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        inner.lru.pop_front()
    }

    /// Marks a frame as no longer evictable. Idempotent: pinning a frame the
    /// replacer does not track is a no-op.
    pub fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.lru.remove(&frame_id);
    }

    /// Marks a frame as evictable. A frame already tracked keeps its position;
    /// a full replacer ignores the request.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.lru.contains(&frame_id) {
            return;
        }
        if inner.lru.len() >= inner.max_size {
            return;
        }
        inner.lru.insert(frame_id);
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().lru.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample() {
        let lru_replacer = LruReplacer::new(7);

        // Add six frames to the replacer. We have [1,2,3,4,5,6].
        lru_replacer.unpin(1);
        lru_replacer.unpin(2);
        lru_replacer.unpin(3);
        lru_replacer.unpin(4);
        lru_replacer.unpin(5);
        lru_replacer.unpin(6);
        lru_replacer.unpin(1);
        assert_eq!(lru_replacer.size(), 6);

        // Victims come back in unpin order.
        assert_eq!(lru_replacer.victim(), Some(1));
        assert_eq!(lru_replacer.victim(), Some(2));
        assert_eq!(lru_replacer.victim(), Some(3));

        // Pin frames 3 and 4; 3 was already evicted so only 4 leaves.
        lru_replacer.pin(3);
        lru_replacer.pin(4);
        assert_eq!(lru_replacer.size(), 2);

        lru_replacer.unpin(4);

        assert_eq!(lru_replacer.victim(), Some(5));
        assert_eq!(lru_replacer.victim(), Some(6));
        assert_eq!(lru_replacer.victim(), Some(4));
        assert_eq!(lru_replacer.victim(), None);
    }

    #[test]
    fn test_repeated_unpin_does_not_reorder() {
        let lru_replacer = LruReplacer::new(3);
        lru_replacer.unpin(1);
        lru_replacer.unpin(2);
        lru_replacer.unpin(1);
        assert_eq!(lru_replacer.size(), 2);
        assert_eq!(lru_replacer.victim(), Some(1));
        assert_eq!(lru_replacer.victim(), Some(2));
    }

    #[test]
    fn test_capacity_is_respected() {
        let lru_replacer = LruReplacer::new(2);
        lru_replacer.unpin(1);
        lru_replacer.unpin(2);
        lru_replacer.unpin(3);
        assert_eq!(lru_replacer.size(), 2);
        assert_eq!(lru_replacer.victim(), Some(1));
        assert_eq!(lru_replacer.victim(), Some(2));
        assert_eq!(lru_replacer.victim(), None);
    }
}
