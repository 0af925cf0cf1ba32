use thiserror::Error;

use super::messages::EngineErrorBody;

/// Failures of the engine connection itself.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Session not ready: {0}")]
    NotReady(String),
    #[error("Connection closed")]
    Closed,
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// How an engine `error` event affects the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Malformed or rejected configuration. The session is disabled.
    Fatal,
    /// The engine found no audio to commit.
    EmptyCommit,
    /// The engine already has a response in progress.
    ResponseConflict,
    /// Anything else. Logged and absorbed.
    Transient,
}

const FATAL_CODES: &[&str] = &[
    "invalid_value",
    "unknown_parameter",
    "missing_required_parameter",
    "invalid_type",
    "session_update_failed",
];

impl EngineErrorBody {
    pub fn classify(&self) -> EngineErrorKind {
        let code = self.code.as_deref().unwrap_or_default();
        match code {
            "input_audio_buffer_commit_empty" => return EngineErrorKind::EmptyCommit,
            "conversation_already_has_active_response" => {
                return EngineErrorKind::ResponseConflict;
            }
            _ => {}
        }

        if FATAL_CODES.contains(&code)
            || self.param.as_deref().is_some_and(|p| p.starts_with("session."))
        {
            return EngineErrorKind::Fatal;
        }

        // Older engine builds report an empty commit without a code.
        if self.message.contains("buffer too small") {
            return EngineErrorKind::EmptyCommit;
        }

        EngineErrorKind::Transient
    }
}
