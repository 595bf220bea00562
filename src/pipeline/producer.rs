//! Paced file producer with keepalive
//!
//! Draining: decode the next frame, wait for its pacer deadline, push it.
//! Keepalive: once the source is exhausted, poll the queue every keepalive
//! interval and re-push the last frame until it is back at the low-watermark.
//! The producer runs until cancelled or until the consumer goes away.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::capture::{Frame, FrameSource};
use crate::pipeline::pacer::Pacer;
use crate::pipeline::queue::BoundedFrameQueue;
use crate::QueueConfig;

/// Producer lifecycle phase, as published through the heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerPhase {
    Starting,
    Draining,
    Keepalive,
    Stopped,
}

/// Snapshot of producer progress
#[derive(Debug, Clone)]
pub struct ProducerStatus {
    pub phase: ProducerPhase,
    pub frames_loaded: u64,
    pub files_skipped: u64,
    pub keepalive_repeats: u64,
    pub last_beat: Instant,
}

/// Liveness signal shared between the producer and the consumer
#[derive(Clone)]
pub struct Heartbeat {
    status: Arc<ArcSwap<ProducerStatus>>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            status: Arc::new(ArcSwap::from_pointee(ProducerStatus {
                phase: ProducerPhase::Starting,
                frames_loaded: 0,
                files_skipped: 0,
                keepalive_repeats: 0,
                last_beat: Instant::now(),
            })),
        }
    }

    pub fn status(&self) -> Arc<ProducerStatus> {
        self.status.load_full()
    }

    pub fn phase(&self) -> ProducerPhase {
        self.status.load().phase
    }

    /// True while the producer is running and has beaten within `max_silence`
    pub fn is_alive(&self, max_silence: Duration) -> bool {
        let status = self.status.load();
        status.phase != ProducerPhase::Stopped && status.last_beat.elapsed() <= max_silence
    }

    fn beat(&self, update: impl Fn(&mut ProducerStatus)) {
        self.status.rcu(|current| {
            let mut next = ProducerStatus::clone(current);
            update(&mut next);
            next.last_beat = Instant::now();
            next
        });
    }
}

/// Why the producer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    Cancelled,
    /// The consumer side closed the queue
    QueueClosed,
}

pub struct FrameProducer {
    source: FrameSource,
    pacer: Pacer,
    queue: BoundedFrameQueue,
    keepalive: QueueConfig,
    heartbeat: Heartbeat,
    cancel: CancellationToken,
}

impl FrameProducer {
    pub fn new(
        source: FrameSource,
        pacer: Pacer,
        queue: BoundedFrameQueue,
        keepalive: QueueConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            pacer,
            queue,
            keepalive,
            heartbeat: Heartbeat::new(),
            cancel,
        }
    }

    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat.clone()
    }

    #[instrument(name = "producer", skip(self), fields(dir = %self.source.dir().display()))]
    pub async fn run(mut self) -> ProducerExit {
        let exit = match self.drain().await {
            Ok(last) => self.keep_alive(last).await,
            Err(exit) => exit,
        };

        self.heartbeat.beat(|s| s.phase = ProducerPhase::Stopped);
        info!(?exit, "Frame producer stopped");
        exit
    }

    /// Push every frame of the source at the paced rate. Returns the last
    /// frame loaded, if any.
    async fn drain(&mut self) -> Result<Option<Frame>, ProducerExit> {
        info!(
            "Starting to load images at {} frames per second",
            1.0 / self.pacer.delay().as_secs_f64()
        );
        self.heartbeat.beat(|s| s.phase = ProducerPhase::Draining);

        let mut ticker = self.pacer.ticker();
        let mut last = None;
        while let Some(frame) = self.source.next() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ProducerExit::Cancelled),
                _ = ticker.tick() => {}
            }
            if self.queue.push(frame.clone()).is_err() {
                return Err(self.closed_exit());
            }
            last = Some(frame);

            let (loaded, skipped) = (self.source.loaded(), self.source.skipped());
            self.heartbeat.beat(|s| {
                s.frames_loaded = loaded;
                s.files_skipped = skipped;
            });
        }

        // The last frame holds for its full interval before keepalive
        if last.is_some() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ProducerExit::Cancelled),
                _ = ticker.tick() => {}
            }
        }

        let skipped = self.source.skipped();
        self.heartbeat.beat(|s| s.files_skipped = skipped);
        info!("All images have been loaded into the queue");
        Ok(last)
    }

    async fn keep_alive(&mut self, last: Option<Frame>) -> ProducerExit {
        self.heartbeat.beat(|s| s.phase = ProducerPhase::Keepalive);
        if last.is_none() {
            warn!("No frame was loaded, keepalive has nothing to repeat");
        }

        let mut ticker = tokio::time::interval(self.keepalive.keepalive_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ProducerExit::Cancelled,
                _ = ticker.tick() => {}
            }

            if self.queue.is_closed() {
                return self.closed_exit();
            }

            let mut repeated = 0;
            if let Some(frame) = &last {
                while self.queue.size() < self.keepalive.low_watermark {
                    if self.queue.push(frame.clone()).is_err() {
                        return self.closed_exit();
                    }
                    repeated += 1;
                }
                if repeated > 0 {
                    debug!(sequence = frame.sequence(), repeated, "Re-queued last frame");
                    metrics::counter!("framefeed_keepalive_repeats_total").increment(repeated);
                }
            }

            self.heartbeat.beat(|s| s.keepalive_repeats += repeated);
        }
    }

    /// A closed queue during shutdown is a cancellation, not a lost consumer
    fn closed_exit(&self) -> ProducerExit {
        if self.cancel.is_cancelled() {
            ProducerExit::Cancelled
        } else {
            ProducerExit::QueueClosed
        }
    }
}
