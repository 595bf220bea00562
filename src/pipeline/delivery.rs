//! Sample delivery for the live decode path
//!
//! The pipeline's streaming thread hands each mapped sample to
//! [`SampleDelivery`], which copies it into an owned [`Frame`] and parks it in
//! the drop-oldest buffer. A single dispatch loop ([`dispatch`]) drains that
//! buffer and invokes the registered [`FrameHandler`] in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capture::{Frame, FrameMetadata, FrameOrigin, PixelFormat};
use crate::pipeline::ringbuf::FrameRingBuffer;

/// Per-sample flow result reported back to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFlow {
    Ok,
    /// This sample failed; the pipeline keeps running
    Error,
}

/// A sample as seen by the sink callback, before it is copied
pub struct MappedSample<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pts: Option<Duration>,
}

/// Turns mapped samples into sequenced frames. One per session.
pub struct SampleDelivery {
    output: Arc<FrameRingBuffer>,
    format: PixelFormat,
    next_sequence: AtomicU64,
    failures: AtomicU64,
}

impl SampleDelivery {
    pub fn new(output: Arc<FrameRingBuffer>, format: PixelFormat) -> Self {
        Self {
            output,
            format,
            next_sequence: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Handle one sample. `Err` means the buffer could not be mapped.
    ///
    /// Runs inline on the streaming thread: copy and return.
    pub fn deliver<E: std::fmt::Display>(&self, sample: Result<MappedSample<'_>, E>) -> SampleFlow {
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("framefeed_live_map_failures_total").increment(1);
                warn!("Failed to map sample buffer: {}", e);
                return SampleFlow::Error;
            }
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let stride = if self.format.is_encoded() { 0 } else { sample.width * 3 };
        let frame = Frame::new(
            Bytes::copy_from_slice(sample.data),
            FrameMetadata {
                sequence,
                width: sample.width,
                height: sample.height,
                stride,
                format: self.format,
                origin: FrameOrigin::Live {
                    captured_at: SystemTime::now(),
                    pts: sample.pts,
                },
            },
        );

        debug!(sequence, bytes = sample.data.len(), "Decoded live frame");
        metrics::counter!("framefeed_live_frames_decoded_total").increment(1);

        if !self.output.push(frame) {
            debug!(sequence, "Output closed, discarding frame");
        }
        SampleFlow::Ok
    }

    /// Frames handed to the output buffer so far
    pub fn delivered(&self) -> u64 {
        self.next_sequence.load(Ordering::Relaxed)
    }

    /// Samples whose buffer could not be mapped
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives each live frame on the dispatch loop
pub trait FrameHandler: Send {
    fn on_frame(&mut self, frame: Frame) -> HandlerResult;
}

impl<F> FrameHandler for F
where
    F: FnMut(Frame) -> HandlerResult + Send,
{
    fn on_frame(&mut self, frame: Frame) -> HandlerResult {
        self(frame)
    }
}

/// Dispatch loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub handler_errors: u64,
}

/// Run the dispatch loop until `cancel` fires or `output` is closed and empty.
///
/// Handler errors are logged and counted; they do not stop the loop.
pub async fn dispatch<H: FrameHandler>(
    output: &FrameRingBuffer,
    handler: &mut H,
    cancel: &CancellationToken,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = output.pop_wait() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let sequence = frame.sequence();
        match handler.on_frame(frame) {
            Ok(()) => stats.handled += 1,
            Err(e) => {
                stats.handler_errors += 1;
                warn!(sequence, "Frame handler failed: {}", e);
            }
        }

        // Give the pipeline side a chance to overwrite before the next pop
        tokio::task::yield_now().await;
    }

    stats
}
