use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::messages::{SessionParams, TranscriptionParams};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Connection parameters for the realtime engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConnectionConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

impl RealtimeConnectionConfig {
    /// Full WebSocket URL including the model query parameter.
    pub fn endpoint(&self) -> String {
        if self.url.contains('?') {
            format!("{}&model={}", self.url, self.model)
        } else {
            format!("{}?model={}", self.url, self.model)
        }
    }

    /// Host component of the endpoint, used for the `Host` header.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme
            .split(['/', '?'])
            .next()
            .unwrap_or(without_scheme)
    }
}

impl Default for RealtimeConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            api_key: String::new(),
        }
    }
}

/// Per-call session parameters sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSessionConfig {
    /// Persona instructions.
    pub instructions: String,
    pub voice: String,
    /// Input transcription model. Empty disables caller transcripts.
    pub transcription_model: String,
    pub temperature: Option<f32>,
    /// How long a response request may stay unconfirmed (ms).
    pub response_request_timeout_ms: u64,
}

impl Default for RealtimeSessionConfig {
    fn default() -> Self {
        Self {
            instructions: "You are a helpful voice assistant on a phone call. \
                Keep replies short and conversational."
                .to_string(),
            voice: "alloy".to_string(),
            transcription_model: "whisper-1".to_string(),
            temperature: None,
            response_request_timeout_ms: 5_000,
        }
    }
}

impl RealtimeSessionConfig {
    pub fn response_request_timeout(&self) -> Duration {
        Duration::from_millis(self.response_request_timeout_ms)
    }

    /// Build the `session.update` payload: µ-law both ways, no server-side
    /// turn detection.
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            modalities: vec!["audio", "text"],
            instructions: self.instructions.clone(),
            voice: self.voice.clone(),
            input_audio_format: "g711_ulaw",
            output_audio_format: "g711_ulaw",
            input_audio_transcription: (!self.transcription_model.is_empty()).then(|| {
                TranscriptionParams {
                    model: self.transcription_model.clone(),
                }
            }),
            turn_detection: None,
            temperature: self.temperature,
        }
    }
}
