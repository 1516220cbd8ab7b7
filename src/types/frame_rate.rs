//! Target frame rate for sink pacing

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum frames per second a sink emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRate(u32);

impl FrameRate {
    pub const DEFAULT: FrameRate = FrameRate(30);

    /// Returns `None` for zero, which has no meaningful interval.
    pub fn new(fps: u32) -> Option<Self> {
        (fps > 0).then_some(FrameRate(fps))
    }

    pub fn fps(self) -> u32 {
        self.0
    }

    /// Pause between two emissions: `1 / fps` seconds.
    pub fn interval(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0.max(1) as f64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}
