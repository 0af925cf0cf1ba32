//! Adapter for the realtime conversational engine.
//!
//! - [`messages`]: wire format of both directions
//! - [`session`]: session and response state machines for one call
//! - [`client`]: the WebSocket connection task

pub mod client;
pub mod config;
pub mod errors;
pub mod messages;
pub mod session;
pub mod transcript;

pub use client::{EngineEvent, RealtimeClient, RealtimeConnection};
pub use config::{RealtimeConnectionConfig, RealtimeSessionConfig};
pub use errors::{EngineErrorKind, RealtimeError, RealtimeResult};
pub use messages::{ClientEvent, ServerEvent};
pub use session::{AiSession, ResponseState, SessionSignal, SessionState};
pub use transcript::{Speaker, TranscriptAccumulator};
