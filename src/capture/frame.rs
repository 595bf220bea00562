use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::capture::decoder;
use crate::error::Result;

/// Frame data with zero-copy semantics
///
/// Cloning a frame only bumps reference counts; the keepalive path relies on
/// this to re-deliver the last frame without reloading it.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub origin: FrameOrigin,
}

/// Where a frame came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrigin {
    File {
        path: PathBuf,
    },
    Live {
        captured_at: SystemTime,
        /// Pipeline running-time of the buffer, if the decoder stamped one
        pts: Option<Duration>,
    },
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB raster
    Rgb24,
    /// PNG-encoded still
    Png,
    /// JPEG-encoded still
    Jpeg,
}

impl PixelFormat {
    pub fn is_encoded(self) -> bool {
        !matches!(self, PixelFormat::Rgb24)
    }
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta: Arc::new(meta),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Source path for file-backed frames
    pub fn path(&self) -> Option<&std::path::Path> {
        match &self.meta.origin {
            FrameOrigin::File { path } => Some(path),
            FrameOrigin::Live { .. } => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.meta.origin, FrameOrigin::Live { .. })
    }

    /// True when `other` carries the same observation as `self`.
    ///
    /// Keepalive re-deliveries share both the sequence index and the
    /// underlying buffer, so consumers use this to skip them.
    pub fn is_repeat_of(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.meta, &other.meta)
            || (self.meta.sequence == other.meta.sequence
                && self.meta.origin == other.meta.origin)
    }

    /// Packed RGB pixels, decoding the still image first if needed
    pub fn to_rgb(&self) -> Result<Bytes> {
        if self.meta.format.is_encoded() {
            let image = decoder::decode_encoded(&self.data)?;
            Ok(Bytes::from(image.into_raw()))
        } else {
            Ok(self.data.clone())
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}
