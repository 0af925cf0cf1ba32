//! Commit gating parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::codec;

/// The engine rejects commits carrying less than 100 ms of audio.
pub const PROTOCOL_MIN_COMMIT_MS: u64 = 100;

/// [`PROTOCOL_MIN_COMMIT_MS`] expressed in µ-law bytes.
pub const PROTOCOL_MIN_COMMIT_BYTES: usize = codec::ms_to_bytes(PROTOCOL_MIN_COMMIT_MS);

/// Configuration for speech buffering and commit decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Minimum buffered bytes before any scheduled commit is eligible.
    pub min_commit_bytes: usize,

    /// Minimum interval between two commits (ms).
    pub commit_cooldown_ms: u64,

    /// Silence after the last speech frame that ends a turn (ms).
    pub silence_ms: u64,

    /// Hard ceiling on a single turn (ms).
    pub max_turn_ms: u64,

    /// Whether trickle commits are issued during speech.
    pub trickle_enabled: bool,

    /// Cadence of trickle commits (ms).
    pub trickle_interval_ms: u64,

    /// New bytes required since the last commit before a trickle commit.
    pub trickle_min_new_bytes: usize,

    /// Commit suppression window after an empty-commit error (ms).
    pub empty_commit_backoff_ms: u64,

    /// How long to wait for the engine to acknowledge a commit (ms).
    pub commit_ack_timeout_ms: u64,

    /// Audio kept from before the first speech frame of a turn (ms).
    pub preroll_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            min_commit_bytes: codec::ms_to_bytes(200),
            commit_cooldown_ms: 500,
            silence_ms: 700,
            max_turn_ms: 15_000,
            trickle_enabled: true,
            trickle_interval_ms: 1_000,
            trickle_min_new_bytes: codec::ms_to_bytes(500),
            empty_commit_backoff_ms: 1_500,
            commit_ack_timeout_ms: 3_000,
            preroll_ms: 100,
        }
    }
}

impl CommitConfig {
    pub fn commit_cooldown(&self) -> Duration {
        Duration::from_millis(self.commit_cooldown_ms)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }

    pub fn max_turn(&self) -> Duration {
        Duration::from_millis(self.max_turn_ms)
    }

    pub fn trickle_interval(&self) -> Duration {
        Duration::from_millis(self.trickle_interval_ms)
    }

    pub fn empty_commit_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_commit_backoff_ms)
    }

    pub fn commit_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_ack_timeout_ms)
    }

    pub fn preroll_bytes(&self) -> usize {
        codec::ms_to_bytes(self.preroll_ms)
    }
}
