//! Remote speech synthesis for locally generated replies.
//!
//! Synthesis runs outside the call task. The call hands a request to the
//! runner, which spawns the HTTP call and delivers the result as a later
//! event.

mod client;

pub use client::HttpSynthesizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SYNTHESIS_URL: &str = "https://api.openai.com/v1/audio/speech";

#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Synthesis service returned {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Empty audio returned")]
    EmptyAudio,
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

/// Remote synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    pub timeout_ms: u64,
    #[serde(skip)]
    pub api_key: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SYNTHESIS_URL.to_string(),
            model: "gpt-4o-mini-tts".to_string(),
            voice: "alloy".to_string(),
            timeout_ms: 10_000,
            api_key: String::new(),
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Turns reply text into 8 kHz µ-law audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> SynthesisResult<Vec<u8>>;
}
