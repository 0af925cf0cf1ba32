use std::fmt;
use thiserror::Error;

/// Why a call ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Engine connection failed: {0}")]
    EngineFailed(String),

    #[error("Engine closed the connection{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    EngineClosed(Option<String>),

    #[error("Engine rejected the session: {0}")]
    EngineFatal(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Why a call session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    /// The telephony side sent `stop`.
    Stopped,
    /// The telephony connection went away.
    TransportClosed,
    Failed(BridgeError),
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}
