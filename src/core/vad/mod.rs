//! Voice Activity Detection for inbound telephony audio.
//!
//! A conservative per-frame energy classifier over µ-law frames, with an
//! optional ambient-noise calibration window at call start.

pub mod config;
pub mod detector;

pub use config::VADConfig;
pub use detector::EnergyVAD;
