pub mod capture;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameOrigin, PixelFormat};
pub use error::{FeedError, Result};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub file: FileConfig,
    pub pacer: PacerConfig,
    pub queue: QueueConfig,
    pub live: LiveConfig,
}

/// Directory-backed source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Image directory; may contain [`utils::ROOT_FOLDER_PLACEHOLDER`]
    pub image_dir: Option<PathBuf>,
    /// Substituted for the placeholder in `image_dir`
    pub root_folder: Option<PathBuf>,
    /// Recognized image extensions, matched case-insensitively
    pub extensions: Vec<String>,
}

/// Frame pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub target_frames_per_second: f64,
    pub max_frame_count: Option<usize>,
}

/// Keepalive policy of the file-backed queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Re-push the last frame while fewer than this many frames are pending
    pub low_watermark: usize,
    pub keepalive_interval_ms: u64,
}

/// Still encoder at the tail of the live decode graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillEncoder {
    Png,
    Jpeg,
}

/// Live UDP/H264 decode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub port: u16,
    pub encoder: StillEncoder,
    /// Undelivered frames held before the oldest is dropped
    pub output_capacity: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            image_dir: None,
            root_folder: None,
            extensions: vec!["png".to_string()],
        }
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            target_frames_per_second: 2.0,
            max_frame_count: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            low_watermark: 2,
            keepalive_interval_ms: 1000,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            port: 11111,
            encoder: StillEncoder::Png,
            output_capacity: 1,
        }
    }
}

impl PacerConfig {
    /// Validated pacing configuration; never clamps.
    pub fn new(target_frames_per_second: f64, max_frame_count: Option<usize>) -> Result<Self> {
        let config = Self {
            target_frames_per_second,
            max_frame_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fps = self.target_frames_per_second;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(FeedError::InvalidFrameRate(fps));
        }
        if self.max_frame_count == Some(0) {
            return Err(FeedError::InvalidFrameCount);
        }
        Ok(())
    }
}

impl QueueConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "queue.keepalive_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_capacity == 0 {
            return Err(FeedError::InvalidConfig(
                "live.output_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `FRAMEFEED__*` environment
    /// overrides. The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("FRAMEFEED")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("file.extensions")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pacer.validate()?;
        self.queue.validate()?;
        self.live.validate()?;
        if self.file.extensions.is_empty() {
            return Err(FeedError::InvalidConfig(
                "file.extensions must name at least one extension".into(),
            ));
        }
        Ok(())
    }
}
