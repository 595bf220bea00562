pub mod delivery;
pub mod graph;
pub mod pacer;
pub mod producer;
pub mod queue;
pub mod ringbuf;

pub use delivery::{dispatch, DispatchStats, FrameHandler, HandlerResult, SampleDelivery, SampleFlow};
pub use graph::{PipelineGraph, PipelineState};
pub use pacer::Pacer;
pub use producer::{FrameProducer, Heartbeat, ProducerExit, ProducerPhase, ProducerStatus};
pub use queue::{frame_queue, BoundedFrameQueue, FrameReceiver, Recv};
pub use ringbuf::{BufferStats, FrameRingBuffer};
