//! Live decode graph description and lifecycle states
//!
//! The graph is described declaratively and rendered to a `gst-launch`
//! description, so it can be inspected and tested without GStreamer.

use std::fmt;

use crate::{LiveConfig, PixelFormat, StillEncoder};

/// Name of the sink element frames are pulled from
pub const SINK_NAME: &str = "framesink";

/// One processing stage of the live graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Network datagram source
    UdpSource { port: u16 },
    /// Elastic buffering between stages
    Queue,
    /// Bounded queue that discards its oldest buffer when full
    LeakyQueue { max_buffers: u32 },
    /// Caps assertion on the incoming byte stream
    CapsFilter { caps: String },
    /// Parser + decoder auto-selection
    DecodeBin,
    VideoConvert,
    Encoder(StillEncoder),
    /// Callback sink holding at most `max_buffers`, dropping old ones
    AppSink { name: String, max_buffers: u32 },
}

impl Stage {
    /// GStreamer element factory implementing this stage
    pub fn factory(&self) -> &'static str {
        match self {
            Stage::UdpSource { .. } => "udpsrc",
            Stage::Queue | Stage::LeakyQueue { .. } => "queue",
            Stage::CapsFilter { .. } => "capsfilter",
            Stage::DecodeBin => "decodebin",
            Stage::VideoConvert => "videoconvert",
            Stage::Encoder(StillEncoder::Png) => "pngenc",
            Stage::Encoder(StillEncoder::Jpeg) => "jpegenc",
            Stage::AppSink { .. } => "appsink",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::UdpSource { port } => write!(f, "udpsrc port={port}"),
            Stage::LeakyQueue { max_buffers } => write!(
                f,
                "queue max-size-buffers={max_buffers} max-size-bytes=0 max-size-time=0 leaky=downstream"
            ),
            Stage::CapsFilter { caps } => write!(f, "capsfilter caps=\"{caps}\""),
            Stage::AppSink { name, max_buffers } => write!(
                f,
                "appsink name={name} emit-signals=false sync=false max-buffers={max_buffers} drop=true"
            ),
            other => f.write_str(other.factory()),
        }
    }
}

/// Ordered chain of stages from network source to frame sink
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    stages: Vec<Stage>,
    encoder: StillEncoder,
}

impl PipelineGraph {
    /// UDP H264 byte-stream → decoded still frames
    pub fn udp_h264(config: &LiveConfig) -> Self {
        let capacity = config.output_capacity.max(1) as u32;
        let stages = vec![
            Stage::UdpSource { port: config.port },
            Stage::Queue,
            Stage::CapsFilter {
                caps: "video/x-h264, stream-format=(string)byte-stream".to_string(),
            },
            Stage::DecodeBin,
            Stage::Queue,
            Stage::VideoConvert,
            Stage::Queue,
            Stage::Encoder(config.encoder),
            Stage::LeakyQueue {
                max_buffers: capacity,
            },
            Stage::AppSink {
                name: SINK_NAME.to_string(),
                max_buffers: capacity,
            },
        ];

        Self {
            stages,
            encoder: config.encoder,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Format of the buffers reaching the sink
    pub fn output_format(&self) -> PixelFormat {
        match self.encoder {
            StillEncoder::Png => PixelFormat::Png,
            StillEncoder::Jpeg => PixelFormat::Jpeg,
        }
    }

    /// Distinct element factories the graph needs
    pub fn factories(&self) -> Vec<&'static str> {
        let mut factories: Vec<_> = self.stages.iter().map(Stage::factory).collect();
        factories.sort_unstable();
        factories.dedup();
        factories
    }

    /// `gst-launch` style description
    pub fn launch_string(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ! ")
    }
}

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl PipelineState {
    /// States visited, in order, when driving from `self` to `target`.
    /// Excludes `self`, includes `target`.
    pub fn path_to(self, target: PipelineState) -> Vec<PipelineState> {
        use PipelineState::*;
        const ORDER: [PipelineState; 4] = [Null, Ready, Paused, Playing];

        let from = self as usize;
        let to = target as usize;
        if to >= from {
            ORDER[from + 1..=to].to_vec()
        } else {
            ORDER[to..from].iter().rev().copied().collect()
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
