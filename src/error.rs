use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the ingestion subsystem
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid frame rate {0}: expected a positive, finite number of frames per second")]
    InvalidFrameRate(f64),

    #[error("max frame count must be at least 1")]
    InvalidFrameCount,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image directory {} does not exist or is not a directory", .0.display())]
    MissingDirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to decode encoded frame: {0}")]
    EncodedFrame(#[from] image::ImageError),

    #[error("frame queue is closed")]
    QueueClosed,

    #[error("failed to start producer: {0}")]
    Producer(#[source] std::io::Error),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T, E = FeedError> = std::result::Result<T, E>;
