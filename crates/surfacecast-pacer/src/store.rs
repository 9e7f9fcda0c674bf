//! The Frame Store: a bounded, ordered queue of [`StoredFrame`]s.
//!
//! Single-producer/single-consumer in practice (the producer callback
//! enqueues, the Pacer dequeues), but guarded by a single mutex held for the
//! minimum time needed to complete one operation, per the shared-resource
//! policy. Telemetry counters are lock-free atomics sampled independently of
//! the mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::frame::CapturedFrame;

/// A [`CapturedFrame`] owned by the Frame Store, tagged with the monotonic
/// time it was enqueued.
#[derive(Clone, Debug)]
pub struct StoredFrame {
    pub frame: CapturedFrame,
    pub enqueued_at: Instant,
}

impl StoredFrame {
    fn new(frame: CapturedFrame) -> Self {
        Self {
            enqueued_at: Instant::now(),
            frame,
        }
    }
}

/// Bounded ordered queue of `StoredFrame` with capacity = `buffer_depth +
/// margin` (margin absorbs one overflow slot so `enqueue` can report what it
/// dropped instead of silently discarding).
pub struct FrameStore {
    capacity: usize,
    queue: Mutex<VecDeque<StoredFrame>>,
    dropped_overflow: AtomicU64,
    dropped_stale: AtomicU64,
}

impl FrameStore {
    /// `buffer_depth` is the target depth; the store's actual capacity
    /// reserves one extra slot for overflow absorption.
    pub fn new(buffer_depth: u32) -> Self {
        let capacity = buffer_depth.max(1) as usize + 1;
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            dropped_overflow: AtomicU64::new(0),
            dropped_stale: AtomicU64::new(0),
        }
    }

    /// Insert `frame` at the back. If the store was already at capacity, the
    /// oldest entry is evicted and returned so the caller can release it;
    /// `dropped_overflow` is incremented in that case.
    pub fn enqueue(&self, frame: CapturedFrame) -> Option<StoredFrame> {
        let mut queue = self.queue.lock();
        let dropped = if queue.len() >= self.capacity {
            self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(StoredFrame::new(frame));
        dropped
    }

    /// Remove and return the oldest stored frame, if any. Does not release
    /// it; the caller now owns it.
    pub fn dequeue_oldest(&self) -> Option<StoredFrame> {
        self.queue.lock().pop_front()
    }

    /// Remove and return the newest stored frame, releasing (dropping) all
    /// older entries and counting them as stale.
    pub fn dequeue_latest(&self) -> Option<StoredFrame> {
        let mut queue = self.queue.lock();
        let newest = queue.pop_back()?;
        let stale = queue.len() as u64;
        queue.clear();
        if stale > 0 {
            self.dropped_stale.fetch_add(stale, Ordering::Relaxed);
        }
        Some(newest)
    }

    /// Drop every stored frame except the newest. Returns the number
    /// discarded. A no-op on an empty or single-element queue.
    pub fn discard_all_but_latest(&self) -> usize {
        let mut queue = self.queue.lock();
        if queue.len() <= 1 {
            return 0;
        }
        let newest = queue.pop_back();
        let discarded = queue.len();
        queue.clear();
        if let Some(newest) = newest {
            queue.push_back(newest);
        }
        if discarded > 0 {
            self.dropped_stale
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        discarded
    }

    /// Drop the single oldest entry, counting it as a stale discard. Used by
    /// the Pacer's oversupply-trimming resync path. Returns whether anything
    /// was discarded.
    pub fn try_discard_oldest_stale(&self) -> bool {
        let mut queue = self.queue.lock();
        if queue.pop_front().is_some() {
            self.dropped_stale.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Current number of stored frames.
    pub fn count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Configured capacity (`buffer_depth + margin`).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    pub fn dropped_stale(&self) -> u64 {
        self.dropped_stale.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameStorage;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn dummy_frame() -> CapturedFrame {
        CapturedFrame::new(
            FrameStorage::Cpu(Arc::from(vec![0u8; 1].into_boxed_slice())),
            1,
            1,
            4,
            Instant::now(),
            SystemTime::now(),
            None,
        )
    }

    #[test]
    fn test_capacity_is_buffer_depth_plus_margin() {
        let store = FrameStore::new(3);
        assert_eq!(store.capacity(), 4);
    }

    #[test]
    fn test_enqueue_then_dequeue_latest_on_empty_queue() {
        let store = FrameStore::new(3);
        let dropped = store.enqueue(dummy_frame());
        assert!(dropped.is_none());
        let latest = store.dequeue_latest();
        assert!(latest.is_some());
        assert_eq!(store.dropped_stale(), 0);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest_and_counts_it() {
        let store = FrameStore::new(2); // capacity 3
        for _ in 0..3 {
            assert!(store.enqueue(dummy_frame()).is_none());
        }
        assert!(store.enqueue(dummy_frame()).is_some());
        assert_eq!(store.dropped_overflow(), 1);
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_discard_all_but_latest_is_noop_on_single_element() {
        let store = FrameStore::new(3);
        store.enqueue(dummy_frame());
        let discarded = store.discard_all_but_latest();
        assert_eq!(discarded, 0);
        assert_eq!(store.dropped_stale(), 0);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_discard_all_but_latest_keeps_newest() {
        let store = FrameStore::new(5);
        for _ in 0..4 {
            store.enqueue(dummy_frame());
        }
        let discarded = store.discard_all_but_latest();
        assert_eq!(discarded, 3);
        assert_eq!(store.dropped_stale(), 3);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_fifo_ordering_preserved() {
        let store = FrameStore::new(5);
        let first = dummy_frame();
        let first_instant = first.capture_instant();
        store.enqueue(first);
        store.enqueue(dummy_frame());
        let oldest = store.dequeue_oldest().unwrap();
        assert_eq!(oldest.frame.capture_instant(), first_instant);
    }

    #[test]
    fn test_try_discard_oldest_stale_empty_queue() {
        let store = FrameStore::new(3);
        assert!(!store.try_discard_oldest_stale());
        assert_eq!(store.dropped_stale(), 0);
    }
}
