//! Turn-taking: when to commit caller audio and which replies may be spoken.
//!
//! The orchestrator owns the detector, the speech buffer, the commit gate and
//! the reply dedup guard. It borrows the engine session whenever it needs to
//! send something.
//!
//! Scheduler tick, evaluated in priority order:
//!
//! ```text
//! (A) turn open ∧ (silence ≥ silence_ms ∨ turn ≥ max_turn_ms) ∧ gate open
//!         → turn commit, respond = no response outstanding
//! (B) speaking ∧ trickle cadence ∧ new bytes ≥ threshold ∧ gate open
//!     ∧ no response outstanding
//!         → trickle commit, respond = false
//! ```

use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{ResponseMode, TurnConfig};
use super::dedup::ReplyDedupGuard;
use super::filler::is_filler;
use super::intent::LocalIntent;
use crate::core::realtime::AiSession;
use crate::core::speech::{
    CommitBlock, CommitCause, CommitConfig, CommitEvent, CommitGate, FlushOutcome, SpeechBuffer,
};
use crate::core::vad::{EnergyVAD, VADConfig};

/// Classification of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    pub is_speech: bool,
    /// This frame opened a new caller turn.
    pub turn_opened: bool,
}

/// What to do once the caller's turn has been transcribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDecision {
    /// Nothing to do: the response was already requested, or the turn is not
    /// awaiting a decision.
    None,
    /// Filler or empty speech. No reply.
    Ignore,
    /// Speak a canned local reply.
    SpeakLocal { intent: LocalIntent, text: String },
    /// An engine response was requested.
    EngineResponse,
    /// The reply would repeat the last one.
    Suppressed,
}

pub struct TurnOrchestrator {
    config: TurnConfig,
    vad: EnergyVAD,
    buffer: SpeechBuffer,
    gate: CommitGate,
    dedup: ReplyDedupGuard,
    /// Turn items whose response request waits for the transcript.
    awaiting_decision: HashSet<String>,
    /// Engine responses cut by the dedup guard. Their audio is dropped.
    cut_responses: HashSet<String>,
    commits: Vec<CommitEvent>,
}

impl TurnOrchestrator {
    pub fn new(
        config: TurnConfig,
        vad_config: VADConfig,
        commit_config: CommitConfig,
        now: Instant,
    ) -> Self {
        let buffer = SpeechBuffer::new(commit_config.preroll_bytes());
        Self {
            dedup: ReplyDedupGuard::new(config.dedup_cooldown()),
            config,
            vad: EnergyVAD::new(vad_config, now),
            buffer,
            gate: CommitGate::new(commit_config),
            awaiting_decision: HashSet::new(),
            cut_responses: HashSet::new(),
            commits: Vec::new(),
        }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn vad(&self) -> &EnergyVAD {
        &self.vad
    }

    pub fn buffer(&self) -> &SpeechBuffer {
        &self.buffer
    }

    pub fn gate(&self) -> &CommitGate {
        &self.gate
    }

    /// Every commit issued so far, in order.
    pub fn commits(&self) -> &[CommitEvent] {
        &self.commits
    }

    /// Classify and buffer one inbound frame.
    pub fn on_frame(&mut self, frame: &[u8], now: Instant) -> FrameOutcome {
        let is_speech = self.vad.classify(frame, now);
        let turn_opened = self.buffer.accumulate(frame, is_speech, now);
        FrameOutcome {
            is_speech,
            turn_opened,
        }
    }

    /// One scheduler tick. Returns the commit issued, if any.
    pub fn tick(&mut self, session: &mut AiSession, now: Instant) -> Option<CommitEvent> {
        self.gate.expire_stale(now);
        session.expire_stale_request(now);

        if !self.buffer.in_turn() {
            return None;
        }

        let healthy = session.is_healthy();
        let outstanding = session.has_outstanding_response();
        let commit_config = self.gate.config();
        let trickle_enabled = commit_config.trickle_enabled;
        let trickle_min_new_bytes = commit_config.trickle_min_new_bytes;

        let silence_reached = self
            .vad
            .silence_elapsed(now)
            .is_some_and(|gap| gap >= commit_config.silence_timeout());
        let max_reached = self
            .buffer
            .turn_elapsed(now)
            .is_some_and(|elapsed| elapsed >= commit_config.max_turn());

        // (A) turn end
        if silence_reached || max_reached {
            match self.gate.blocked_by(healthy, self.buffer.len(), now) {
                None => {
                    let cause = if silence_reached {
                        CommitCause::Silence
                    } else {
                        CommitCause::MaxDuration
                    };
                    return self.commit(session, cause, !outstanding, now);
                }
                Some(CommitBlock::SessionUnhealthy) if max_reached => {
                    let dropped = self.buffer.discard();
                    warn!(
                        dropped_bytes = dropped,
                        "Turn exceeded its maximum while the engine is unavailable, audio dropped"
                    );
                    return None;
                }
                Some(block) => {
                    debug!(block = ?block, "Turn end pending");
                }
            }
        }

        // (B) trickle
        if trickle_enabled
            && !outstanding
            && self.vad.is_speaking(now)
            && self.gate.trickle_due(now)
            && self.buffer.new_bytes_since_commit() >= trickle_min_new_bytes
            && self.gate.can_commit(healthy, self.buffer.len(), now)
        {
            return self.commit(session, CommitCause::Trickle, false, now);
        }

        None
    }

    /// Flush the buffer through the gate and hand the segment to the engine.
    ///
    /// In `engine` mode a turn commit with `respond` also requests a reply. In
    /// `local_first` mode the request waits for the turn's transcript.
    pub fn commit(
        &mut self,
        session: &mut AiSession,
        cause: CommitCause,
        respond: bool,
        now: Instant,
    ) -> Option<CommitEvent> {
        let outcome = self
            .gate
            .flush(&mut self.buffer, session.is_healthy(), cause, respond, now);

        let (event, segment) = match outcome {
            FlushOutcome::Committed { event, segment } => (event, segment),
            FlushOutcome::TooShort { .. } | FlushOutcome::Blocked(_) => return None,
        };

        if let Err(e) = session.append_and_commit(&segment) {
            warn!(cause = %cause, "Failed to send commit to engine: {}", e);
            self.gate.abandon_last();
            return None;
        }

        if event.respond && self.config.response_mode == ResponseMode::Engine {
            session.request_response(now);
        }

        self.commits.push(event.clone());
        Some(event)
    }

    /// Final commit on call termination. Anything below the protocol
    /// minimum, or blocked by the gate, is discarded.
    pub fn flush_on_stop(&mut self, session: &mut AiSession, now: Instant) -> Option<CommitEvent> {
        let event = if self.buffer.is_empty() {
            None
        } else {
            self.commit(session, CommitCause::Stop, false, now)
        };
        let dropped = self.buffer.discard();
        if dropped > 0 {
            debug!(dropped_bytes = dropped, "Discarded caller audio at stop");
        }
        event
    }

    /// The engine acknowledged the oldest outstanding commit.
    pub fn on_commit_acknowledged(
        &mut self,
        session: &mut AiSession,
        item_id: String,
        now: Instant,
    ) {
        let Some((cause, respond)) = self.gate.acknowledge() else {
            debug!(item_id = %item_id, "Acknowledgement with no outstanding commit");
            return;
        };
        if !cause.ends_turn() {
            return;
        }
        if !session.transcribes_caller() {
            // No caller transcript will ever complete this turn.
            if respond && self.config.response_mode == ResponseMode::LocalFirst {
                self.request_engine_response(session, now);
            }
            return;
        }
        if respond && self.config.response_mode == ResponseMode::LocalFirst {
            self.awaiting_decision.insert(item_id.clone());
        }
        session.mark_turn_item(item_id);
    }

    /// The engine found the committed buffer empty.
    pub fn on_empty_commit(&mut self, now: Instant) {
        self.gate.on_empty_commit(now);
        let dropped = self.buffer.discard();
        if dropped > 0 {
            debug!(dropped_bytes = dropped, "Discarded buffered audio after empty commit");
        }
    }

    /// Any other engine error releases the in-flight commit.
    pub fn on_engine_error(&mut self) {
        self.gate.release();
    }

    /// Decide the reply to a transcribed caller turn.
    pub fn on_caller_turn(
        &mut self,
        session: &mut AiSession,
        item_id: &str,
        text: Option<&str>,
        failed: bool,
        now: Instant,
    ) -> TurnDecision {
        if !self.awaiting_decision.remove(item_id) {
            return TurnDecision::None;
        }

        if failed {
            info!(item_id = %item_id, "Transcription failed, deferring to the engine");
            return self.request_engine_response(session, now);
        }

        let text = text.unwrap_or_default();
        if is_filler(text, self.config.filler_max_chars) {
            debug!(item_id = %item_id, transcript = %text, "Filler turn, no reply");
            return TurnDecision::Ignore;
        }

        if let Some(intent) = LocalIntent::classify(text) {
            let reply = intent.reply();
            if !self.dedup.check_and_record(reply, now) {
                return TurnDecision::Suppressed;
            }
            info!(intent = intent.as_str(), "Answering locally");
            return TurnDecision::SpeakLocal {
                intent,
                text: reply.to_string(),
            };
        }

        self.request_engine_response(session, now)
    }

    fn request_engine_response(&mut self, session: &mut AiSession, now: Instant) -> TurnDecision {
        if session.request_response(now) {
            TurnDecision::EngineResponse
        } else {
            TurnDecision::None
        }
    }

    /// Check an engine reply against the dedup guard. A rejected reply's
    /// remaining audio is dropped until the response finishes.
    pub fn on_assistant_transcript(&mut self, response_id: &str, text: &str, now: Instant) -> bool {
        if text.trim().is_empty() || self.dedup.check_and_record(text, now) {
            return true;
        }
        self.cut_responses.insert(response_id.to_string());
        false
    }

    /// Drop the rest of a response's audio, e.g. after barge-in.
    pub fn cut_response(&mut self, response_id: &str) {
        self.cut_responses.insert(response_id.to_string());
    }

    pub fn is_response_cut(&self, response_id: &str) -> bool {
        self.cut_responses.contains(response_id)
    }

    pub fn on_response_finished(&mut self, response_id: &str) {
        self.cut_responses.remove(response_id);
    }

    pub fn replies_suppressed(&self) -> u64 {
        self.dedup.suppressed()
    }

    /// Drop every buffer and pending decision.
    pub fn shutdown(&mut self) {
        self.buffer.discard();
        self.vad.reset();
        self.awaiting_decision.clear();
        self.cut_responses.clear();
    }
}
