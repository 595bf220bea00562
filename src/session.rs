//! Session orchestration
//!
//! A session is either file-backed (paced producer on its own thread, pull
//! interface for the consumer) or live (decode pipeline driving a frame
//! handler). Each exposes exactly one output abstraction.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::capture::FrameSource;
use crate::error::{FeedError, Result};
use crate::pipeline::{frame_queue, FrameProducer, FrameReceiver, Heartbeat, Pacer, ProducerExit};
use crate::Config;

#[cfg(feature = "gstreamer-pipeline")]
use crate::capture::LiveDecodePipeline;

/// Where frames come from
#[derive(Debug, Clone)]
pub enum FeedSource {
    Directory(PathBuf),
    Live,
}

/// An opened session, ready to be consumed
pub enum Session {
    File(FileSession),
    #[cfg(feature = "gstreamer-pipeline")]
    Live(LiveDecodePipeline),
}

impl Session {
    /// Validate the configuration and build the component graph for `source`.
    /// File sessions start producing immediately; live sessions start when
    /// run.
    pub fn open(source: FeedSource, config: &Config) -> Result<Self> {
        config.validate()?;
        match source {
            FeedSource::Directory(dir) => Ok(Session::File(FileSession::start(&dir, config)?)),
            FeedSource::Live => {
                #[cfg(feature = "gstreamer-pipeline")]
                {
                    Ok(Session::Live(LiveDecodePipeline::new(&config.live)?))
                }
                #[cfg(not(feature = "gstreamer-pipeline"))]
                {
                    Err(FeedError::Pipeline(
                        "live decode requires the gstreamer-pipeline feature".into(),
                    ))
                }
            }
        }
    }
}

/// File-backed session: paced producer isolated on its own OS thread.
///
/// The producer thread owns the only sender, so the receiver reports
/// [`Recv::Closed`](crate::pipeline::Recv::Closed) once the producer is gone,
/// whatever the reason.
pub struct FileSession {
    receiver: FrameReceiver,
    heartbeat: Heartbeat,
    frame_interval: Duration,
    cancel: CancellationToken,
    producer: Option<JoinHandle<ProducerExit>>,
}

impl FileSession {
    /// Validate pacing, list the directory and spawn the producer. Nothing is
    /// started if any step fails.
    #[instrument(skip(config))]
    pub fn start(dir: &Path, config: &Config) -> Result<Self> {
        let pacer = Pacer::new(&config.pacer)?;
        config.queue.validate()?;
        let source = FrameSource::open(dir, &config.file.extensions, config.pacer.max_frame_count)?;

        let (queue, receiver) = frame_queue();
        let cancel = CancellationToken::new();
        let producer = FrameProducer::new(
            source,
            pacer,
            queue,
            config.queue.clone(),
            cancel.clone(),
        );
        let heartbeat = producer.heartbeat();
        let frame_interval = pacer.delay();

        // The producer gets its own runtime so a stalled consumer runtime
        // cannot delay its timers
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(FeedError::Producer)?;

        let handle = std::thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || runtime.block_on(producer.run()))
            .map_err(FeedError::Producer)?;

        info!("Frame producer started");

        Ok(Self {
            receiver,
            heartbeat,
            frame_interval,
            cancel,
            producer: Some(handle),
        })
    }

    /// Pull interface for the consumer
    pub fn receiver(&self) -> &FrameReceiver {
        &self.receiver
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Paced delay between fresh frames
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Ask the producer to stop without waiting for it. Frames already queued
    /// stay readable, then the receiver reports the queue closed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the producer, refuse further pushes, wait for the producer
    /// thread and discard undelivered frames.
    pub fn stop(mut self) -> Option<ProducerExit> {
        let exit = self.shutdown();
        let discarded = self.receiver.close_and_discard();
        info!(?exit, discarded, "File session stopped");
        exit
    }

    fn shutdown(&mut self) -> Option<ProducerExit> {
        self.cancel.cancel();
        self.receiver.close();
        let handle = self.producer.take()?;
        match handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                warn!("Frame producer panicked");
                None
            }
        }
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        // Signal only; never block the host on the producer thread
        self.cancel.cancel();
        self.receiver.close();
    }
}
