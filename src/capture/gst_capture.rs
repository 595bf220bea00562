//! GStreamer live decode pipeline: UDP H264 byte-stream in, still frames out

use std::sync::Arc;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FeedError, Result};
use crate::pipeline::delivery::{dispatch, DispatchStats, FrameHandler, MappedSample, SampleDelivery, SampleFlow};
use crate::pipeline::graph::{PipelineGraph, PipelineState, SINK_NAME};
use crate::pipeline::ringbuf::{BufferStats, FrameRingBuffer};
use crate::LiveConfig;

/// Bus messages forwarded to the dispatch loop
#[derive(Debug)]
enum BusEvent {
    Error(String),
    Eos,
}

/// Live session counters
#[derive(Debug, Clone, Copy)]
pub struct LiveStats {
    pub state: PipelineState,
    pub buffer: BufferStats,
    pub delivered: u64,
    pub map_failures: u64,
}

/// Live decode pipeline with a capacity-bounded, drop-oldest frame output
pub struct LiveDecodePipeline {
    pipeline: gst::Pipeline,
    graph: PipelineGraph,
    state: PipelineState,
    output: Arc<FrameRingBuffer>,
    delivery: Arc<SampleDelivery>,
    bus_events: flume::Receiver<BusEvent>,
}

impl LiveDecodePipeline {
    /// Build the decode graph in the NULL state. Nothing is bound yet.
    pub fn new(config: &LiveConfig) -> Result<Self> {
        gst::init()
            .map_err(|e| FeedError::Pipeline(format!("Failed to initialize GStreamer: {}", e)))?;

        let graph = PipelineGraph::udp_h264(config);

        let missing = missing_elements(graph.factories());
        if !missing.is_empty() {
            return Err(FeedError::Pipeline(format!(
                "missing GStreamer elements: {}",
                missing.join(", ")
            )));
        }

        let description = graph.launch_string();
        info!("Pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| FeedError::Pipeline(format!("invalid pipeline description: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| FeedError::Pipeline("Failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name(SINK_NAME)
            .ok_or_else(|| FeedError::Pipeline("Failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| FeedError::Pipeline("Failed to cast to AppSink".into()))?;

        let output = Arc::new(FrameRingBuffer::new(config.output_capacity));
        let delivery = Arc::new(SampleDelivery::new(output.clone(), graph.output_format()));

        let sink_delivery = delivery.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| on_new_sample(sink, &sink_delivery))
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| FeedError::Pipeline("Pipeline has no bus".into()))?;
        let (tx, bus_events) = flume::unbounded();
        bus.set_sync_handler(move |_, msg| {
            forward_bus_message(msg, &tx);
            gst::BusSyncReply::Drop
        });

        Ok(Self {
            pipeline,
            graph,
            state: PipelineState::Null,
            output,
            delivery,
            bus_events,
        })
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive NULL → READY → PAUSED → PLAYING. On failure the pipeline is
    /// returned to NULL before the error is reported.
    pub fn start(&mut self) -> Result<()> {
        info!("Starting live decode pipeline");

        // Leftovers from a previous run must not end this one
        for event in self.bus_events.drain() {
            debug!(?event, "Discarding stale bus event");
        }
        let stale = self.output.reopen();
        if stale > 0 {
            debug!(stale, "Discarded undelivered frames from previous run");
        }

        if let Err(e) = self.drive_to(PipelineState::Playing) {
            error!("Failed to start pipeline: {}", e);
            if let Err(stop_err) = self.stop() {
                warn!("Failed to return pipeline to NULL: {}", stop_err);
            }
            return Err(e);
        }
        info!("Pipeline started successfully");
        Ok(())
    }

    /// Return to NULL, releasing the socket and every element resource
    pub fn stop(&mut self) -> Result<()> {
        self.output.close();
        if self.state != PipelineState::Null {
            info!("Stopping live decode pipeline");
        }

        // Also after a failed start, where some elements may have left NULL
        let result = self
            .pipeline
            .set_state(gst::State::Null)
            .map(|_| ())
            .map_err(|e| FeedError::Pipeline(format!("Failed to stop pipeline: {:?}", e)));
        self.state = PipelineState::Null;
        result
    }

    fn drive_to(&mut self, target: PipelineState) -> Result<()> {
        for next in self.state.path_to(target) {
            self.pipeline
                .set_state(gst_state(next))
                .map_err(|_| FeedError::Pipeline(format!("Failed to enter {}", next)))?;
            self.state = next;
            debug!(state = %next, "Pipeline state changed");

            // Construction errors such as an unavailable port surface here
            while let Ok(event) = self.bus_events.try_recv() {
                match event {
                    BusEvent::Error(e) => return Err(FeedError::Pipeline(e)),
                    BusEvent::Eos => {}
                }
            }
        }
        Ok(())
    }

    /// Start the pipeline and feed every decoded frame to `handler` until
    /// `cancel` fires, the stream ends or the pipeline fails. The pipeline is
    /// back in NULL when this returns, on every path.
    #[instrument(name = "live", skip_all)]
    pub async fn run<H: FrameHandler>(
        &mut self,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Result<DispatchStats> {
        self.start()?;

        let session = cancel.child_token();
        let output = &self.output;
        let bus_events = &self.bus_events;

        let watch_bus = async {
            match bus_events.recv_async().await {
                Ok(BusEvent::Error(e)) => {
                    error!("Pipeline error: {}", e);
                    session.cancel();
                    Some(FeedError::Pipeline(e))
                }
                Ok(BusEvent::Eos) => {
                    info!("End of stream");
                    session.cancel();
                    None
                }
                Err(_) => None,
            }
        };

        let deliver = async {
            let stats = dispatch(output, handler, &session).await;
            // Output closed: nothing left for the bus watch to guard
            session.cancel();
            stats
        };

        let (stats, fatal) = tokio::join!(deliver, async {
            tokio::select! {
                _ = session.cancelled() => None,
                fatal = watch_bus => fatal,
            }
        });

        let stopped = self.stop();
        let live = self.stats();
        info!(
            handled = stats.handled,
            handler_errors = stats.handler_errors,
            delivered = live.delivered,
            dropped = live.buffer.dropped,
            map_failures = live.map_failures,
            "Live session finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => stopped.map(|_| stats),
        }
    }

    pub fn stats(&self) -> LiveStats {
        LiveStats {
            state: self.state,
            buffer: self.output.stats(),
            delivered: self.delivery.delivered(),
            map_failures: self.delivery.failures(),
        }
    }
}

impl Drop for LiveDecodePipeline {
    fn drop(&mut self) {
        let _ = self.stop();
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
    }
}

/// Map, copy, unmap. Runs on the sink's streaming thread.
fn on_new_sample(
    sink: &gst_app::AppSink,
    delivery: &SampleDelivery,
) -> std::result::Result<gst::FlowSuccess, gst::FlowError> {
    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;

    let (width, height) = sample
        .caps()
        .and_then(|caps| caps.structure(0))
        .map(|s| {
            (
                s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                s.get::<i32>("height").unwrap_or(0).max(0) as u32,
            )
        })
        .unwrap_or((0, 0));

    let flow = match sample.buffer() {
        Some(buffer) => {
            let pts = buffer.pts().map(|pts| Duration::from_nanos(pts.nseconds()));
            match buffer.map_readable() {
                Ok(map) => delivery.deliver::<gst::glib::BoolError>(Ok(MappedSample {
                    data: map.as_slice(),
                    width,
                    height,
                    pts,
                })),
                Err(e) => delivery.deliver(Err(e)),
            }
        }
        None => delivery.deliver::<&str>(Err("sample has no buffer")),
    };

    match flow {
        SampleFlow::Ok => Ok(gst::FlowSuccess::Ok),
        // Flagged for this sample only; a FlowError would stop upstream.
        // Already logged and counted by the delivery.
        SampleFlow::Error => Ok(gst::FlowSuccess::CustomSuccess),
    }
}

/// Factories from `factories` that are not installed
fn missing_elements<'a>(factories: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    factories
        .into_iter()
        .filter(|factory| gst::ElementFactory::find(factory).is_none())
        .collect()
}

fn forward_bus_message(msg: &gst::Message, tx: &flume::Sender<BusEvent>) {
    use gst::MessageView;

    let event = match msg.view() {
        MessageView::Error(err) => {
            let source = err.src().map(|src| src.name()).unwrap_or_default();
            BusEvent::Error(format!(
                "{}: {} ({})",
                source,
                err.error(),
                err.debug().unwrap_or_default()
            ))
        }
        MessageView::Warning(w) => {
            warn!("Pipeline warning: {}", w.error());
            return;
        }
        MessageView::Eos(..) => BusEvent::Eos,
        _ => return,
    };

    let _ = tx.send(event);
}

fn gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}
