//! Drop-oldest output buffer for the live decode path

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use tokio::sync::Notify;

use crate::capture::Frame;

/// Fixed-capacity frame buffer that overwrites the oldest undelivered frame
/// instead of blocking the writer.
///
/// One writer (the pipeline streaming thread) and one reader (the dispatch
/// loop). The lock is held only for a push or a pop.
pub struct FrameRingBuffer {
    ring: Mutex<HeapRb<Frame>>,
    notify: Notify,
    closed: AtomicBool,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_read: AtomicUsize,
    frames_dropped: AtomicUsize,
}

/// Snapshot of buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub written: usize,
    pub read: usize,
    pub dropped: usize,
}

impl FrameRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(HeapRb::new(capacity.max(1))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: push a frame, dropping the oldest one when full.
    ///
    /// Returns false if the buffer was closed and the frame discarded.
    pub fn push(&self, frame: Frame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let evicted = self.lock().push_overwrite(frame);
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = evicted {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("framefeed_live_frames_dropped_total").increment(1);
            tracing::debug!(sequence = old.sequence(), "Dropped undelivered frame");
        }

        self.notify.notify_one();
        true
    }

    /// Consumer: pop the oldest pending frame
    pub fn pop(&self) -> Option<Frame> {
        let frame = self.lock().try_pop()?;
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Consumer: wait for the next frame. `None` once closed and drained.
    pub async fn pop_wait(&self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.pop() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            // Single consumer: a push racing with this check leaves a permit
            self.notify.notified().await;
        }
    }

    /// Refuse further pushes and wake the consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Accept pushes again after [`close`](Self::close). Frames left over from
    /// the previous run are discarded.
    pub fn reopen(&self) -> usize {
        let mut ring = self.lock();
        let mut stale = 0;
        while ring.try_pop().is_some() {
            stale += 1;
        }
        self.closed.store(false, Ordering::Release);
        stale
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity().get()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            written: self.stats.frames_written.load(Ordering::Relaxed),
            read: self.stats.frames_read.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeapRb<Frame>> {
        // A panic while holding the lock cannot leave the ring inconsistent
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, FrameOrigin, PixelFormat};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn live_frame(sequence: u64) -> Frame {
        Frame::new(
            Bytes::from_static(b"png"),
            FrameMetadata {
                sequence,
                width: 0,
                height: 0,
                stride: 0,
                format: PixelFormat::Png,
                origin: FrameOrigin::Live {
                    captured_at: SystemTime::UNIX_EPOCH,
                    pts: None,
                },
            },
        )
    }

    #[test]
    fn capacity_one_keeps_newest() {
        let buffer = FrameRingBuffer::new(1);
        for i in 0..4 {
            assert!(buffer.push(live_frame(i)));
            assert_eq!(buffer.len(), 1);
        }

        assert_eq!(buffer.pop().unwrap().sequence(), 3);
        assert!(buffer.pop().is_none());
        assert_eq!(
            buffer.stats(),
            BufferStats {
                written: 4,
                read: 1,
                dropped: 3
            }
        );
    }

    #[test]
    fn larger_capacity_preserves_order() {
        let buffer = FrameRingBuffer::new(2);
        for i in 0..3 {
            buffer.push(live_frame(i));
        }
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.pop().unwrap().sequence(), 1);
        assert_eq!(buffer.pop().unwrap().sequence(), 2);
    }

    #[test]
    fn closed_buffer_rejects_pushes() {
        let buffer = FrameRingBuffer::new(1);
        buffer.close();
        assert!(!buffer.push(live_frame(0)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn reopen_discards_leftovers_and_accepts_pushes() {
        let buffer = FrameRingBuffer::new(1);
        buffer.push(live_frame(1));
        buffer.close();

        assert_eq!(buffer.reopen(), 1);
        assert!(!buffer.is_closed());
        assert!(buffer.push(live_frame(2)));
        assert_eq!(buffer.pop().unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn pop_wait_wakes_on_push_and_close() {
        let buffer = Arc::new(FrameRingBuffer::new(1));

        let writer = buffer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.push(live_frame(9));
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.close();
        });

        assert_eq!(buffer.pop_wait().await.unwrap().sequence(), 9);
        assert!(buffer.pop_wait().await.is_none());
    }
}
