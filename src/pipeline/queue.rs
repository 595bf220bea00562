//! Frame queue between the file producer and the consumer
//!
//! The queue is soft-capped: pushes never block and never drop, and the
//! producer instead watches [`BoundedFrameQueue::size`] against a
//! low-watermark to decide when to top it up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::debug;

use crate::capture::Frame;
use crate::error::{FeedError, Result};

/// Producer half of the frame queue
#[derive(Clone)]
pub struct BoundedFrameQueue {
    tx: Sender<Frame>,
    closed: Arc<AtomicBool>,
}

/// Consumer half of the frame queue
pub struct FrameReceiver {
    rx: Receiver<Frame>,
    closed: Arc<AtomicBool>,
}

/// Outcome of a bounded wait on the queue
#[derive(Debug)]
pub enum Recv {
    Frame(Frame),
    /// Nothing pending, or nothing arrived within the wait
    Empty,
    /// The producer side is gone and the queue is drained
    Closed,
}

/// Create a connected producer/consumer pair
pub fn frame_queue() -> (BoundedFrameQueue, FrameReceiver) {
    let (tx, rx) = flume::unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    (
        BoundedFrameQueue {
            tx,
            closed: closed.clone(),
        },
        FrameReceiver { rx, closed },
    )
}

impl BoundedFrameQueue {
    /// Enqueue a frame. Never blocks.
    pub fn push(&self, frame: Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FeedError::QueueClosed);
        }
        self.tx.send(frame).map_err(|_| FeedError::QueueClosed)?;
        metrics::counter!("framefeed_frames_queued_total").increment(1);
        Ok(())
    }

    /// Approximate number of pending frames
    pub fn size(&self) -> usize {
        self.tx.len()
    }

    /// Stop accepting pushes
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_disconnected()
    }
}

impl FrameReceiver {
    /// Block until the next frame is available
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    pub async fn recv_async(&self) -> Option<Frame> {
        self.rx.recv_async().await.ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Recv {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Recv::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Recv::Empty,
            Err(RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }

    pub fn try_recv(&self) -> Recv {
        match self.rx.try_recv() {
            Ok(frame) => Recv::Frame(frame),
            Err(TryRecvError::Empty) => Recv::Empty,
            Err(TryRecvError::Disconnected) => Recv::Closed,
        }
    }

    /// Approximate number of pending frames
    pub fn size(&self) -> usize {
        self.rx.len()
    }

    /// Refuse further pushes. Pending frames stay readable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Close the queue to further pushes and discard what is pending
    pub fn close_and_discard(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let discarded = self.rx.drain().count();
        if discarded > 0 {
            debug!("Discarded {} undelivered frames", discarded);
        }
        discarded
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, FrameOrigin, PixelFormat};
    use bytes::Bytes;

    fn frame(sequence: u64) -> Frame {
        Frame::new(
            Bytes::from(vec![sequence as u8]),
            FrameMetadata {
                sequence,
                width: 1,
                height: 1,
                stride: 1,
                format: PixelFormat::Rgb24,
                origin: FrameOrigin::File {
                    path: format!("f{sequence:04}.png").into(),
                },
            },
        )
    }

    #[test]
    fn preserves_fifo_order() {
        let (queue, rx) = frame_queue();
        for i in 0..5 {
            queue.push(frame(i)).unwrap();
        }
        assert_eq!(queue.size(), 5);
        let order: Vec<u64> = (0..5).map(|_| rx.recv().unwrap().sequence()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(rx.size(), 0);
    }

    #[test]
    fn push_after_close_fails() {
        let (queue, rx) = frame_queue();
        queue.push(frame(0)).unwrap();
        queue.push(frame(1)).unwrap();

        assert_eq!(rx.close_and_discard(), 2);
        assert!(queue.is_closed());
        assert!(matches!(queue.push(frame(2)), Err(FeedError::QueueClosed)));
    }

    #[test]
    fn producer_close_refuses_pushes() {
        let (queue, _rx) = frame_queue();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.push(frame(0)), Err(FeedError::QueueClosed)));
    }

    #[test]
    fn dropped_receiver_closes_queue() {
        let (queue, rx) = frame_queue();
        drop(rx);
        assert!(matches!(queue.push(frame(0)), Err(FeedError::QueueClosed)));
    }

    #[test]
    fn receiver_close_keeps_pending_frames() {
        let (queue, rx) = frame_queue();
        queue.push(frame(3)).unwrap();
        rx.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.push(frame(4)), Err(FeedError::QueueClosed)));
        assert!(matches!(rx.try_recv(), Recv::Frame(f) if f.sequence() == 3));
        assert!(matches!(rx.try_recv(), Recv::Empty));
    }

    #[test]
    fn timeout_and_disconnect_are_distinguished() {
        let (queue, rx) = frame_queue();
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Recv::Empty
        ));
        queue.push(frame(7)).unwrap();
        drop(queue);
        assert!(matches!(rx.try_recv(), Recv::Frame(f) if f.sequence() == 7));
        assert!(matches!(rx.try_recv(), Recv::Closed));
    }
}
