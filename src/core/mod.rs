pub mod call;
pub mod codec;
pub mod playback;
pub mod realtime;
pub mod speech;
pub mod synthesis;
pub mod turn;
pub mod vad;

// Re-export commonly used types for convenience
pub use call::{
    BridgeConfig, BridgeError, BridgeResult, CallDependencies, CallSession, CallSummary,
    TransportCommand, TransportEvent, run_call_session,
};
pub use playback::{PacerConfig, PlaybackPacer};
pub use realtime::{AiSession, RealtimeClient, RealtimeConnectionConfig, RealtimeSessionConfig};
pub use speech::{CommitConfig, CommitGate, SpeechBuffer};
pub use synthesis::{HttpSynthesizer, SpeechSynthesizer, SynthesisConfig, SynthesisError};
pub use turn::{ResponseMode, TurnConfig, TurnOrchestrator};
pub use vad::{EnergyVAD, VADConfig};
