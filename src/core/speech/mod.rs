//! Speech buffering and the commit gate.
//!
//! Caller audio is buffered per turn and handed to the engine in commits.
//! The gate owns every timing rule around commits: the in-flight flag,
//! the inter-commit cooldown, the empty-commit backoff and the trickle
//! cadence.

pub mod buffer;
pub mod config;
pub mod gate;

pub use buffer::{SpeechBuffer, SpeechSegment};
pub use config::{CommitConfig, PROTOCOL_MIN_COMMIT_BYTES, PROTOCOL_MIN_COMMIT_MS};
pub use gate::{CommitBlock, CommitCause, CommitEvent, CommitGate, FlushOutcome};
