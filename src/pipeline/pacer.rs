use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::error::{FeedError, Result};
use crate::PacerConfig;

/// Inter-frame deadline derived from a target frame rate
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(config: &PacerConfig) -> Result<Self> {
        config.validate()?;
        let fps = config.target_frames_per_second;
        let delay = Duration::try_from_secs_f64(1.0 / fps)
            .map_err(|_| FeedError::InvalidFrameRate(fps))?;
        Ok(Self { delay })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Emission deadlines one `delay` apart, first one immediate.
    ///
    /// Work done between ticks (decoding the next file) eats into the
    /// interval instead of adding to it. A late tick pushes later deadlines
    /// back rather than bursting to catch up.
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
