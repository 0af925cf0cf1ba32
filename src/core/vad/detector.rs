//! Per-frame energy classifier.
//!
//! The classifier is deliberately trivial: one pass over the frame, one
//! comparison. It runs on every 20 ms inbound frame.
//!
//! ```text
//! [Calibrating] ── window elapsed ──► [Frozen]
//!   threshold = max(base, mean_ambient + offset)
//! ```

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::codec;

use super::config::VADConfig;

/// Energy-threshold voice activity detector for µ-law frames.
#[derive(Debug)]
pub struct EnergyVAD {
    config: VADConfig,
    threshold: f32,
    started_at: Instant,
    calibration: Option<Calibration>,
    last_speech_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Calibration {
    frames: u64,
    energy_sum: f64,
}

impl Calibration {
    fn observe(&mut self, energy: f32) -> f32 {
        self.frames += 1;
        self.energy_sum += energy as f64;
        (self.energy_sum / self.frames as f64) as f32
    }
}

impl EnergyVAD {
    /// Create a detector whose calibration window (if any) starts at `now`.
    pub fn new(config: VADConfig, now: Instant) -> Self {
        let calibration = config.calibration_enabled().then(Calibration::default);
        Self {
            threshold: config.speech_threshold,
            config,
            started_at: now,
            calibration,
            last_speech_at: None,
        }
    }

    /// Mean µ-law magnitude of a frame. Empty frames have zero energy.
    pub fn frame_energy(frame: &[u8]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum: u32 = frame.iter().map(|&b| codec::magnitude(b) as u32).sum();
        sum as f32 / frame.len() as f32
    }

    /// Classify a frame as speech or silence.
    ///
    /// Speech frames update the last-speech timestamp.
    pub fn classify(&mut self, frame: &[u8], now: Instant) -> bool {
        let energy = Self::frame_energy(frame);
        self.calibrate(energy, now);

        let is_speech = energy >= self.threshold;
        if is_speech {
            self.last_speech_at = Some(now);
        }
        is_speech
    }

    fn calibrate(&mut self, energy: f32, now: Instant) {
        if !self.is_calibrating(now) {
            if let Some(calibration) = self.calibration.take() {
                info!(
                    threshold = self.threshold,
                    frames = calibration.frames,
                    "VAD calibration complete, threshold frozen"
                );
            }
            return;
        }
        let Some(calibration) = self.calibration.as_mut() else {
            return;
        };

        let ambient = calibration.observe(energy);
        let candidate = ambient + self.config.calibration_offset;
        if candidate > self.threshold {
            debug!(
                ambient = ambient,
                threshold = candidate,
                "VAD calibration raised threshold"
            );
            self.threshold = candidate;
        }
    }

    /// Whether the calibration window is still open at `now`, whether or not
    /// a frame has arrived since it elapsed.
    pub fn is_calibrating(&self, now: Instant) -> bool {
        self.calibration.is_some()
            && now.duration_since(self.started_at) < Duration::from_millis(self.config.calibration_ms)
    }

    /// Current speech threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Timestamp of the last speech frame.
    pub fn last_speech_at(&self) -> Option<Instant> {
        self.last_speech_at
    }

    /// Time since the last speech frame, if any speech was heard.
    pub fn silence_elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_speech_at.map(|at| now.duration_since(at))
    }

    /// Whether the caller is currently speaking.
    pub fn is_speaking(&self, now: Instant) -> bool {
        self.silence_elapsed(now)
            .is_some_and(|gap| gap < Duration::from_millis(self.config.speaking_hold_ms))
    }

    /// Forget the last speech timestamp. The calibrated threshold is kept.
    pub fn reset(&mut self) {
        self.last_speech_at = None;
    }
}
