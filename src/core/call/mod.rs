//! Per-call bridging between the telephony stream and the realtime engine.

pub mod config;
pub mod errors;
pub mod runner;
pub mod session;

#[cfg(test)]
mod tests;

pub use config::BridgeConfig;
pub use errors::{BridgeError, BridgeResult, TeardownReason};
pub use runner::{CallDependencies, TransportEvent, run_call_session};
pub use session::{
    CallChannels, CallSession, CallState, CallSummary, SynthesisOutcome, SynthesisRequest,
    TransportCommand,
};
