use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Who decides what to say at the end of a caller turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Turn commits request an engine response directly.
    #[default]
    Engine,
    /// Wait for the caller transcript: ignore filler, answer simple intents
    /// locally, hand everything else to the engine.
    LocalFirst,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => f.write_str("engine"),
            Self::LocalFirst => f.write_str("local_first"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "engine" => Ok(Self::Engine),
            "local_first" | "local-first" | "local" => Ok(Self::LocalFirst),
            other => Err(format!(
                "Invalid response mode '{other}'. Expected 'engine' or 'local_first'"
            )),
        }
    }
}

/// Turn-taking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Commit scheduler interval (ms).
    pub vad_tick_ms: u64,
    /// Window in which an identical reply is suppressed (ms).
    pub dedup_cooldown_ms: u64,
    pub response_mode: ResponseMode,
    /// Cut assistant playback when the caller starts speaking.
    pub barge_in_enabled: bool,
    /// Transcripts with at most this many letters count as filler.
    pub filler_max_chars: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            vad_tick_ms: 100,
            dedup_cooldown_ms: 8_000,
            response_mode: ResponseMode::Engine,
            barge_in_enabled: false,
            filler_max_chars: 2,
        }
    }
}

impl TurnConfig {
    pub fn vad_tick(&self) -> Duration {
        Duration::from_millis(self.vad_tick_ms)
    }

    pub fn dedup_cooldown(&self) -> Duration {
        Duration::from_millis(self.dedup_cooldown_ms)
    }
}
