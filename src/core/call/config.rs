use serde::{Deserialize, Serialize};

use crate::core::playback::PacerConfig;
use crate::core::realtime::RealtimeSessionConfig;
use crate::core::speech::{CommitConfig, PROTOCOL_MIN_COMMIT_BYTES};
use crate::core::synthesis::SynthesisConfig;
use crate::core::turn::{ResponseMode, TurnConfig};
use crate::core::vad::VADConfig;

/// Every per-call tuning option. Built once at startup and shared read-only
/// by all calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub vad: VADConfig,
    pub commit: CommitConfig,
    pub turn: TurnConfig,
    pub pacer: PacerConfig,
    pub realtime: RealtimeSessionConfig,
    pub synthesis: SynthesisConfig,
}

impl BridgeConfig {
    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        let commit = &self.commit;
        if commit.min_commit_bytes < PROTOCOL_MIN_COMMIT_BYTES {
            return Err(format!(
                "min_commit_bytes ({}) must be at least {} (100 ms of audio)",
                commit.min_commit_bytes, PROTOCOL_MIN_COMMIT_BYTES
            ));
        }
        if commit.silence_ms == 0 || commit.max_turn_ms == 0 {
            return Err("silence_ms and max_turn_ms must be greater than 0".to_string());
        }
        if commit.silence_ms >= commit.max_turn_ms {
            return Err(format!(
                "silence_ms ({}) must be shorter than max_turn_ms ({})",
                commit.silence_ms, commit.max_turn_ms
            ));
        }
        if commit.trickle_enabled && commit.trickle_interval_ms == 0 {
            return Err("trickle_interval_ms must be greater than 0".to_string());
        }

        if !(0.0..=127.0).contains(&self.vad.speech_threshold) {
            return Err(format!(
                "VAD speech_threshold must be between 0 and 127, got {}",
                self.vad.speech_threshold
            ));
        }

        if self.turn.vad_tick_ms == 0 {
            return Err("vad_tick_ms must be greater than 0".to_string());
        }
        // Local-first turns complete on the caller transcript.
        if self.turn.response_mode == ResponseMode::LocalFirst
            && self.realtime.transcription_model.trim().is_empty()
        {
            return Err(
                "response_mode local_first requires a transcription_model".to_string(),
            );
        }

        let pacer = &self.pacer;
        if pacer.frame_ms == 0 {
            return Err("Playback frame_ms must be greater than 0".to_string());
        }
        if pacer.max_burst_frames == 0 {
            return Err("max_burst_frames must be at least 1".to_string());
        }
        if pacer.max_queue_frames == 0 || pacer.prebuffer_frames > pacer.max_queue_frames {
            return Err(format!(
                "prebuffer_frames ({}) must not exceed max_queue_frames ({})",
                pacer.prebuffer_frames, pacer.max_queue_frames
            ));
        }

        Ok(())
    }
}
