pub mod decoder;
pub mod file_source;
pub mod frame;

#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;

pub use file_source::FrameSource;
pub use frame::{Frame, FrameMetadata, FrameOrigin, PixelFormat};

#[cfg(feature = "gstreamer-pipeline")]
pub use gst_capture::LiveDecodePipeline;
