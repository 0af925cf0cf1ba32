//! Suppression of repeated assistant replies.

use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

/// Fingerprint of a reply: xxh3 over the trimmed, lowercased text with
/// whitespace runs collapsed.
pub fn fingerprint(text: &str) -> u64 {
    let normalized = text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    xxh3_64(normalized.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReplyDedupState {
    fingerprint: u64,
    spoken_at: Instant,
}

/// Remembers the last reply spoken and rejects an identical one within the
/// cooldown.
#[derive(Debug)]
pub struct ReplyDedupGuard {
    cooldown: Duration,
    last: Option<ReplyDedupState>,
    suppressed: u64,
}

impl ReplyDedupGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
            suppressed: 0,
        }
    }

    /// Returns true if `text` may be spoken, and records it. A suppressed
    /// reply does not refresh the window.
    pub fn check_and_record(&mut self, text: &str, now: Instant) -> bool {
        let fp = fingerprint(text);
        if let Some(last) = self.last
            && last.fingerprint == fp
            && now.duration_since(last.spoken_at) < self.cooldown
        {
            self.suppressed += 1;
            info!(
                since_ms = now.duration_since(last.spoken_at).as_millis() as u64,
                "Suppressing repeated reply"
            );
            return false;
        }

        self.last = Some(ReplyDedupState {
            fingerprint: fp,
            spoken_at: now,
        });
        true
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
