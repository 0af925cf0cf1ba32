//! Wire messages for the realtime conversational engine.
//!
//! - **Outgoing** ([`ClientEvent`]): session configuration, audio append and
//!   commit, response request and cancellation.
//! - **Incoming** ([`ServerEvent`]): configuration acknowledgement, errors,
//!   commit acknowledgements, response lifecycle, transcript and audio deltas.
//!   Event types the bridge does not act on parse as [`ServerEvent::Unknown`].

use serde::{Deserialize, Serialize};

// =============================================================================
// Outgoing Messages (Bridge to Engine)
// =============================================================================

/// Input transcription settings sent with the session configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptionParams {
    pub model: String,
}

/// Session parameters sent once after connecting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionParams {
    pub modalities: Vec<&'static str>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: &'static str,
    pub output_audio_format: &'static str,
    pub input_audio_transcription: Option<TranscriptionParams>,
    /// Always `null`: turn detection is done by the bridge.
    pub turn_detection: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Messages sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionParams },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend {
        /// Base64-encoded µ-law audio
        audio: String,
    },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioCommit,
    #[serde(rename = "response.create")]
    ResponseCreate,
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Event type name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioCommit => "input_audio_buffer.commit",
            Self::ResponseCreate => "response.create",
            Self::ResponseCancel => "response.cancel",
        }
    }
}

// =============================================================================
// Incoming Messages (Engine to Bridge)
// =============================================================================

/// Error payload carried by an `error` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineErrorBody {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
}

/// Response reference carried by lifecycle events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseRef {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Messages received from the engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    #[serde(rename = "error")]
    Error { error: EngineErrorBody },
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioCommitted { item_id: String },
    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseRef },
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseRef },
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    CallerTranscriptDelta { item_id: String, delta: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    CallerTranscriptCompleted { item_id: String, transcript: String },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    CallerTranscriptFailed {
        item_id: String,
        #[serde(default)]
        error: Option<EngineErrorBody>,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    AssistantTranscriptDelta { response_id: String, delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscriptDone {
        response_id: String,
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { response_id: String, delta: String },
    #[serde(rename = "response.audio.done")]
    AudioDone { response_id: String },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parse a text frame from the engine.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
