//! One bridged call.
//!
//! `CallSession` owns every per-call entity and exposes one handler per input.
//! Handlers are synchronous; anything that has to leave the task (transport
//! frames, engine messages, synthesis requests) goes out through a channel.
//!
//! ```text
//! Connecting ──session ready──▶ Active ──teardown──▶ Closing ──▶ Closed
//!      └─────────────────────────teardown──────────────┘
//! ```
//!
//! Once `Closing` every handler is a no-op.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::BridgeConfig;
use super::errors::{BridgeError, TeardownReason};
use crate::core::playback::{PacerOutput, PlaybackPacer};
use crate::core::realtime::{AiSession, ClientEvent, EngineEvent, SessionSignal};
use crate::core::synthesis::SynthesisResult;
use crate::core::turn::{TurnDecision, TurnOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Outbound instruction for the telephony transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Media(Bytes),
    Mark(String),
    /// Drop any audio the transport has buffered.
    Clear,
}

/// A local reply that needs to be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub utterance_id: String,
    pub text: String,
}

/// Result of a synthesis request, delivered back to the call.
#[derive(Debug)]
pub struct SynthesisOutcome {
    pub utterance_id: String,
    pub result: SynthesisResult<Vec<u8>>,
}

/// Channels a call session writes to.
pub struct CallChannels {
    pub engine: mpsc::UnboundedSender<ClientEvent>,
    pub transport: mpsc::UnboundedSender<TransportCommand>,
    pub synthesis: mpsc::UnboundedSender<SynthesisRequest>,
}

/// Counters reported when a call ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    pub stream_sid: String,
    pub call_sid: String,
    pub duration: Duration,
    pub commits: usize,
    pub responses_requested: u64,
    pub replies_suppressed: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

pub struct CallSession {
    stream_sid: String,
    call_sid: String,
    state: CallState,
    created_at: Instant,
    closed_at: Option<Instant>,
    config: Arc<BridgeConfig>,
    orchestrator: TurnOrchestrator,
    ai: AiSession,
    pacer: PlaybackPacer,
    transport: mpsc::UnboundedSender<TransportCommand>,
    synthesis: mpsc::UnboundedSender<SynthesisRequest>,
    /// Marks sent to the transport and not yet echoed back.
    pending_marks: HashSet<String>,
    /// Engine response whose audio waits for the reply dedup check.
    held_response: Option<String>,
    local_utterances: u64,
    failure: Option<BridgeError>,
}

impl CallSession {
    pub fn start(
        stream_sid: impl Into<String>,
        call_sid: impl Into<String>,
        config: Arc<BridgeConfig>,
        channels: CallChannels,
        now: Instant,
    ) -> Self {
        let stream_sid = stream_sid.into();
        let call_sid = call_sid.into();
        info!(stream_sid = %stream_sid, call_sid = %call_sid, "Call session started");

        let orchestrator = TurnOrchestrator::new(
            config.turn.clone(),
            config.vad.clone(),
            config.commit.clone(),
            now,
        );
        let mut ai = AiSession::new(config.realtime.clone(), channels.engine);
        ai.on_connecting();
        let pacer = PlaybackPacer::new(config.pacer.clone());

        Self {
            stream_sid,
            call_sid,
            state: CallState::Connecting,
            created_at: now,
            closed_at: None,
            config,
            orchestrator,
            ai,
            pacer,
            transport: channels.transport,
            synthesis: channels.synthesis,
            pending_marks: HashSet::new(),
            held_response: None,
            local_utterances: 0,
            failure: None,
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, CallState::Closing | CallState::Closed)
    }

    pub fn orchestrator(&self) -> &TurnOrchestrator {
        &self.orchestrator
    }

    pub fn ai(&self) -> &AiSession {
        &self.ai
    }

    pub fn pacer(&self) -> &PlaybackPacer {
        &self.pacer
    }

    /// Marks sent to the transport and not yet played out.
    pub fn pending_marks(&self) -> usize {
        self.pending_marks.len()
    }

    /// Why the call failed, if it did.
    pub fn failure(&self) -> Option<&BridgeError> {
        self.failure.as_ref()
    }

    fn send_transport(&self, command: TransportCommand) {
        if self.transport.send(command).is_err() {
            debug!(stream_sid = %self.stream_sid, "Transport gone, dropping outbound command");
        }
    }

    /// Whether assistant audio is queued, playing, or still expected.
    fn assistant_speaking(&self) -> bool {
        self.pacer.has_pending_audio()
            || !self.pending_marks.is_empty()
            || self.ai.has_outstanding_response()
    }

    /// Inbound caller audio.
    pub fn on_media(&mut self, payload: &[u8], now: Instant) {
        if self.is_closed() || payload.is_empty() {
            return;
        }
        let outcome = self.orchestrator.on_frame(payload, now);
        if outcome.turn_opened && self.config.turn.barge_in_enabled && self.assistant_speaking() {
            self.barge_in();
        }
    }

    /// The transport finished playing up to a mark.
    pub fn on_transport_mark(&mut self, name: &str) {
        if self.is_closed() {
            return;
        }
        if self.pending_marks.remove(name) {
            debug!(mark = %name, "Utterance played out");
        }
    }

    /// Commit scheduler tick.
    pub fn on_schedule_tick(&mut self, now: Instant) {
        if self.is_closed() {
            return;
        }
        self.orchestrator.tick(&mut self.ai, now);
    }

    /// Pacing tick.
    pub fn on_pacer_tick(&mut self) {
        if self.is_closed() {
            return;
        }
        for output in self.pacer.tick() {
            match output {
                PacerOutput::Frame(frame) => self.send_transport(TransportCommand::Media(frame)),
                PacerOutput::Mark(name) => {
                    self.pending_marks.insert(name.clone());
                    self.send_transport(TransportCommand::Mark(name));
                }
            }
        }
    }

    /// A local reply finished synthesizing.
    pub fn on_synthesis(&mut self, outcome: SynthesisOutcome, now: Instant) {
        if self.is_closed() {
            return;
        }
        match outcome.result {
            Ok(audio) => {
                debug!(
                    utterance_id = %outcome.utterance_id,
                    bytes = audio.len(),
                    "Queueing local reply"
                );
                self.pacer.enqueue(&audio);
                self.pacer.mark_utterance_done(outcome.utterance_id);
            }
            Err(e) => {
                warn!(
                    utterance_id = %outcome.utterance_id,
                    "Local reply synthesis failed, asking the engine instead: {}",
                    e
                );
                self.ai.request_response(now);
            }
        }
    }

    /// Event from the engine connection.
    pub fn on_engine_event(&mut self, event: EngineEvent, now: Instant) {
        if self.is_closed() {
            return;
        }
        match event {
            EngineEvent::Connected => self.ai.on_connected(),
            EngineEvent::Server(event) => {
                if let Some(signal) = self.ai.handle_server_event(event) {
                    self.on_session_signal(signal, now);
                }
            }
            EngineEvent::Closed(reason) => {
                self.teardown(TeardownReason::Failed(BridgeError::EngineClosed(reason)), now);
            }
            EngineEvent::Failed(reason) => {
                self.teardown(TeardownReason::Failed(BridgeError::EngineFailed(reason)), now);
            }
        }
    }

    fn on_session_signal(&mut self, signal: SessionSignal, now: Instant) {
        match signal {
            SessionSignal::Ready => {
                if self.state == CallState::Connecting {
                    self.state = CallState::Active;
                    info!(stream_sid = %self.stream_sid, "Call active");
                }
            }
            SessionSignal::CommitAcknowledged { item_id } => {
                self.orchestrator.on_commit_acknowledged(&mut self.ai, item_id, now);
            }
            SessionSignal::EmptyCommit => self.orchestrator.on_empty_commit(now),
            SessionSignal::Fatal(message) => {
                self.teardown(TeardownReason::Failed(BridgeError::EngineFatal(message)), now);
            }
            SessionSignal::EngineError(_) => self.orchestrator.on_engine_error(),
            SessionSignal::ResponseStarted { response_id } => {
                // Nothing of this reply is spoken before its transcript passes dedup.
                self.release_held();
                self.pacer.hold();
                self.held_response = Some(response_id);
            }
            SessionSignal::ResponseFinished { response_id, .. } => {
                // No transcript came: nothing to check against.
                if self.held_response.as_deref() == Some(response_id.as_str()) {
                    self.release_held();
                }
                self.orchestrator.on_response_finished(&response_id);
            }
            SessionSignal::CallerTurn {
                item_id,
                text,
                failed,
            } => {
                let decision = self.orchestrator.on_caller_turn(
                    &mut self.ai,
                    &item_id,
                    text.as_deref(),
                    failed,
                    now,
                );
                if let TurnDecision::SpeakLocal { text, .. } = decision {
                    self.speak_local(text);
                }
            }
            SessionSignal::AssistantTranscript { response_id, text } => {
                let held = self.held_response.as_deref() == Some(response_id.as_str());
                if self
                    .orchestrator
                    .on_assistant_transcript(&response_id, &text, now)
                {
                    if held {
                        self.release_held();
                    }
                } else if held {
                    info!(response_id = %response_id, "Dropping repeated reply before playback");
                    self.held_response = None;
                    self.pacer.discard_held();
                    self.ai.cancel_response();
                } else {
                    info!(response_id = %response_id, "Cutting repeated reply");
                    self.stop_playback();
                    self.ai.cancel_response();
                }
            }
            SessionSignal::Audio { response_id, audio } => {
                if !self.orchestrator.is_response_cut(&response_id) {
                    self.pacer.enqueue(&audio);
                }
            }
            SessionSignal::AudioDone { response_id } => {
                if !self.orchestrator.is_response_cut(&response_id) {
                    self.pacer.mark_utterance_done(response_id);
                }
            }
        }
    }

    fn speak_local(&mut self, text: String) {
        self.local_utterances += 1;
        let utterance_id = format!("local-{}", self.local_utterances);
        if self
            .synthesis
            .send(SynthesisRequest { utterance_id, text })
            .is_err()
        {
            warn!("Synthesis worker gone, local reply dropped");
        }
    }

    fn release_held(&mut self) {
        if self.held_response.take().is_some() {
            self.pacer.release();
        }
    }

    fn stop_playback(&mut self) {
        self.held_response = None;
        self.pacer.clear();
        self.pending_marks.clear();
        self.send_transport(TransportCommand::Clear);
    }

    fn barge_in(&mut self) {
        info!(stream_sid = %self.stream_sid, "Caller barged in, stopping playback");
        self.stop_playback();
        if let Some(response_id) = self.ai.active_response_id().map(str::to_owned) {
            self.orchestrator.cut_response(&response_id);
        }
        self.ai.cancel_response();
    }

    /// Tear the call down. Only the first call has any effect.
    pub fn teardown(&mut self, reason: TeardownReason, now: Instant) {
        if self.is_closed() {
            return;
        }
        self.state = CallState::Closing;

        if self.ai.is_healthy() {
            self.orchestrator.flush_on_stop(&mut self.ai, now);
        }
        self.orchestrator.shutdown();
        self.pacer.destroy();
        self.held_response = None;
        self.ai.on_closed();
        self.pending_marks.clear();

        if let TeardownReason::Failed(error) = &reason {
            warn!(stream_sid = %self.stream_sid, "Call failed: {}", error);
            self.failure = Some(error.clone());
        }

        self.state = CallState::Closed;
        self.closed_at = Some(now);
        let summary = self.summary();
        info!(
            stream_sid = %self.stream_sid,
            call_sid = %self.call_sid,
            reason = %reason,
            duration_ms = summary.duration.as_millis() as u64,
            commits = summary.commits,
            responses = summary.responses_requested,
            suppressed = summary.replies_suppressed,
            frames_sent = summary.frames_sent,
            frames_dropped = summary.frames_dropped,
            "Call session closed"
        );
    }

    pub fn summary(&self) -> CallSummary {
        let end = self.closed_at.unwrap_or_else(Instant::now);
        CallSummary {
            stream_sid: self.stream_sid.clone(),
            call_sid: self.call_sid.clone(),
            duration: end.duration_since(self.created_at),
            commits: self.orchestrator.commits().len(),
            responses_requested: self.ai.responses_requested(),
            replies_suppressed: self.orchestrator.replies_suppressed(),
            frames_sent: self.pacer.frames_sent(),
            frames_dropped: self.pacer.frames_dropped(),
        }
    }
}
