//! Turn-taking orchestration and reply suppression.

pub mod config;
pub mod dedup;
pub mod filler;
pub mod intent;
pub mod orchestrator;

pub use config::{ResponseMode, TurnConfig};
pub use dedup::{ReplyDedupGuard, fingerprint};
pub use filler::is_filler;
pub use intent::LocalIntent;
pub use orchestrator::{FrameOutcome, TurnDecision, TurnOrchestrator};
