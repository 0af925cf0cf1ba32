//! Configuration for the energy-based voice activity detector.

use serde::{Deserialize, Serialize};

/// Configuration for [`EnergyVAD`](super::EnergyVAD).
///
/// Energy is measured in µ-law magnitude code units (0..=127), averaged over
/// one transport frame. Phone-line noise typically sits below 10; voiced
/// speech lands well above 30.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VADConfig {
    /// Mean frame magnitude at or above which a frame counts as speech.
    pub speech_threshold: f32,

    /// Length of the ambient-noise calibration window after call start (ms).
    ///
    /// Zero disables calibration.
    pub calibration_ms: u64,

    /// Offset added to the measured ambient level during calibration.
    pub calibration_offset: f32,

    /// How long after the last speech frame the caller still counts as speaking (ms).
    pub speaking_hold_ms: u64,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 20.0,
            calibration_ms: 0,
            calibration_offset: 8.0,
            speaking_hold_ms: 250,
        }
    }
}

impl VADConfig {
    /// Create a new config with the specified speech threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.speech_threshold = threshold;
        self
    }

    /// Create a new config with calibration enabled.
    pub fn with_calibration(mut self, window_ms: u64, offset: f32) -> Self {
        self.calibration_ms = window_ms;
        self.calibration_offset = offset;
        self
    }

    /// Check whether calibration is configured.
    pub fn calibration_enabled(&self) -> bool {
        self.calibration_ms > 0
    }
}
