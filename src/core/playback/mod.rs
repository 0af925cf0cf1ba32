//! Paced playback of engine and synthesized audio to the call.

pub mod config;
pub mod framer;
pub mod pacer;

pub use config::PacerConfig;
pub use framer::Reframer;
pub use pacer::{PacerOutput, PlaybackPacer, PlaybackQueue};
