//! Media-stream error types

use thiserror::Error;

/// Media-stream handler error types
#[derive(Debug, Error)]
pub enum MediaStreamError {
    /// The frame is not a valid media-stream message
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// The media payload is not valid base64
    #[error("Invalid media payload: {0}")]
    InvalidPayload(String),

    /// The socket closed before the stream started
    #[error("Stream closed before start")]
    NotStarted,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Result type for media-stream operations
pub type MediaStreamResult<T> = Result<T, MediaStreamError>;
