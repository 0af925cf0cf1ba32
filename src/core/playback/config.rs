use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::codec::FRAME_MS;

/// Playback pacing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    /// Pacing interval, one transport frame (ms).
    pub frame_ms: u64,
    /// Frames queued before playback of an utterance starts.
    pub prebuffer_frames: usize,
    /// Queue depth above which ticks send a catch-up burst.
    pub high_water_frames: usize,
    /// Frames per tick while catching up.
    pub max_burst_frames: usize,
    /// Hard cap on queued frames. Oldest frames are dropped beyond it.
    pub max_queue_frames: usize,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            frame_ms: FRAME_MS,
            prebuffer_frames: 4,
            high_water_frames: 50,
            max_burst_frames: 3,
            max_queue_frames: 1_500,
        }
    }
}

impl PacerConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
}
