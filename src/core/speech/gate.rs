//! Commit eligibility and the flush transition.
//!
//! The gate serializes commits with an in-flight flag, enforces the
//! inter-commit cooldown and the empty-commit backoff, and refuses to emit a
//! segment shorter than the engine accepts.
//!
//! The engine acknowledges commits in the order they were sent, so every
//! issued commit waits in a FIFO until its acknowledgement arrives. An
//! acknowledgement timeout reopens the gate but keeps the entry queued, so a
//! late acknowledgement is still matched to the right commit.

use std::collections::VecDeque;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::buffer::{SpeechBuffer, SpeechSegment};
use super::config::{CommitConfig, PROTOCOL_MIN_COMMIT_BYTES};

/// Why a commit was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCause {
    /// Periodic partial commit during speech. Never requests a response.
    Trickle,
    /// Silence after speech exceeded the silence threshold.
    Silence,
    /// The turn exceeded the hard duration ceiling.
    MaxDuration,
    /// Final flush on call termination.
    Stop,
}

impl CommitCause {
    /// Whether this cause ends the caller's turn.
    pub fn ends_turn(self) -> bool {
        !matches!(self, Self::Trickle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trickle => "trickle",
            Self::Silence => "silence",
            Self::MaxDuration => "max_duration",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CommitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a commit that was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub cause: CommitCause,
    pub respond: bool,
    pub at: Instant,
    pub bytes: usize,
}

/// Reason a commit is currently not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitBlock {
    SessionUnhealthy,
    InFlight,
    Cooldown,
    Backoff,
    BelowMinimum,
}

/// Result of a flush attempt.
#[derive(Debug)]
pub enum FlushOutcome {
    /// The segment left the buffer and must be sent to the engine.
    Committed {
        event: CommitEvent,
        segment: SpeechSegment,
    },
    /// The buffer holds less than the engine accepts. It was kept.
    TooShort { bytes: usize },
    /// A gate condition refused the commit. The buffer was kept.
    Blocked(CommitBlock),
}

/// Upper bound on commits waiting for an acknowledgement.
const MAX_PENDING_ACKS: usize = 8;

#[derive(Debug, Clone, Copy)]
struct PendingAck {
    cause: CommitCause,
    respond: bool,
    at: Instant,
    /// Timed out: no longer blocks commits, still owns the next matching ack.
    expired: bool,
}

/// Decides when buffered speech may be committed.
#[derive(Debug)]
pub struct CommitGate {
    config: CommitConfig,
    pending: VecDeque<PendingAck>,
    last_commit_at: Option<Instant>,
    last_trickle_at: Option<Instant>,
    backoff_until: Option<Instant>,
    commits_issued: u64,
}

impl CommitGate {
    pub fn new(config: CommitConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            last_commit_at: None,
            last_trickle_at: None,
            backoff_until: None,
            commits_issued: 0,
        }
    }

    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// First condition blocking a commit, ignoring the buffered size.
    fn hard_block(&self, healthy: bool, now: Instant) -> Option<CommitBlock> {
        if !healthy {
            return Some(CommitBlock::SessionUnhealthy);
        }
        if self.is_in_flight() {
            return Some(CommitBlock::InFlight);
        }
        if self.in_backoff(now) {
            return Some(CommitBlock::Backoff);
        }
        if self
            .last_commit_at
            .is_some_and(|at| now.duration_since(at) < self.config.commit_cooldown())
        {
            return Some(CommitBlock::Cooldown);
        }
        None
    }

    /// First condition blocking a scheduled commit of `buffered` bytes.
    pub fn blocked_by(&self, healthy: bool, buffered: usize, now: Instant) -> Option<CommitBlock> {
        self.hard_block(healthy, now).or_else(|| {
            (buffered < self.config.min_commit_bytes).then_some(CommitBlock::BelowMinimum)
        })
    }

    /// Whether a scheduled commit of `buffered` bytes is allowed now.
    pub fn can_commit(&self, healthy: bool, buffered: usize, now: Instant) -> bool {
        self.blocked_by(healthy, buffered, now).is_none()
    }

    /// Whether the trickle cadence has elapsed.
    pub fn trickle_due(&self, now: Instant) -> bool {
        let since = self.last_trickle_at.or(self.last_commit_at);
        since.is_none_or(|at| now.duration_since(at) >= self.config.trickle_interval())
    }

    /// Move the buffered audio out as a committed segment.
    ///
    /// Segments below the protocol minimum are refused and stay buffered.
    /// Turn-ending causes close the turn; trickle keeps it open.
    pub fn flush(
        &mut self,
        buffer: &mut SpeechBuffer,
        healthy: bool,
        cause: CommitCause,
        respond: bool,
        now: Instant,
    ) -> FlushOutcome {
        if let Some(block) = self.hard_block(healthy, now) {
            debug!(cause = %cause, block = ?block, "Commit blocked");
            return FlushOutcome::Blocked(block);
        }

        let bytes = buffer.len();
        if bytes < PROTOCOL_MIN_COMMIT_BYTES {
            debug!(
                cause = %cause,
                bytes = bytes,
                min_bytes = PROTOCOL_MIN_COMMIT_BYTES,
                "Commit rejected: segment below protocol minimum"
            );
            return FlushOutcome::TooShort { bytes };
        }

        // Trickle commits never request a response.
        let respond = respond && cause != CommitCause::Trickle;
        let segment = buffer.take(now);
        if cause.ends_turn() {
            buffer.close_turn();
        } else {
            self.last_trickle_at = Some(now);
        }

        if self.pending.len() == MAX_PENDING_ACKS
            && let Some(dropped) = self.pending.pop_front()
        {
            warn!(cause = %dropped.cause, "Too many unacknowledged commits, forgetting the oldest");
        }
        self.pending.push_back(PendingAck {
            cause,
            respond,
            at: now,
            expired: false,
        });
        self.last_commit_at = Some(now);
        self.commits_issued += 1;

        info!(
            cause = %cause,
            respond = respond,
            bytes = segment.len(),
            duration_ms = segment.duration().as_millis() as u64,
            "Committing caller audio"
        );

        FlushOutcome::Committed {
            event: CommitEvent { cause, respond, at: now, bytes },
            segment,
        }
    }

    /// The engine acknowledged the oldest outstanding commit.
    ///
    /// Returns the cause and response flag of the acknowledged commit.
    pub fn acknowledge(&mut self) -> Option<(CommitCause, bool)> {
        let ack = self.pending.pop_front()?;
        if ack.expired {
            debug!(cause = %ack.cause, "Late acknowledgement for a timed-out commit");
        }
        Some((ack.cause, ack.respond))
    }

    /// The engine reported an empty commit: start the backoff window.
    pub fn on_empty_commit(&mut self, now: Instant) {
        self.pending.pop_front();
        self.backoff_until = Some(now + self.config.empty_commit_backoff());
        warn!(
            backoff_ms = self.config.empty_commit_backoff_ms,
            "Empty commit reported, backing off"
        );
    }

    /// Any other engine error releases the oldest commit still in flight.
    /// Timed-out commits ahead of it keep their place in the queue.
    pub fn release(&mut self) {
        if let Some(index) = self.pending.iter().position(|a| !a.expired) {
            self.pending.remove(index);
        }
    }

    /// The last commit never reached the engine.
    pub fn abandon_last(&mut self) {
        self.pending.pop_back();
    }

    /// Reopen the gate for commits the engine has not acknowledged in time.
    pub fn expire_stale(&mut self, now: Instant) -> bool {
        let timeout = self.config.commit_ack_timeout();
        let mut stale = false;
        for ack in self.pending.iter_mut().filter(|a| !a.expired) {
            if now.duration_since(ack.at) >= timeout {
                ack.expired = true;
                stale = true;
            }
        }
        if stale {
            warn!(
                timeout_ms = self.config.commit_ack_timeout_ms,
                "Commit acknowledgement timed out, releasing in-flight flag"
            );
        }
        stale
    }

    pub fn in_backoff(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.iter().any(|a| !a.expired)
    }

    /// Commits still waiting for an acknowledgement, timed out or not.
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    pub fn last_commit_at(&self) -> Option<Instant> {
        self.last_commit_at
    }

    pub fn commits_issued(&self) -> u64 {
        self.commits_issued
    }
}
