//! Per-call session with the realtime engine.
//!
//! `AiSession` owns the outbound half of the engine connection and two state
//! machines: the session lifecycle and the response lifecycle.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Configuring ──session.updated──▶ Healthy
//!                                                      │                             │
//!                                                      └──────── fatal error ────────┴──▶ Error
//!                                       (any state) ──close──▶ Closed
//!
//! Idle ──request──▶ Requested ──response.created──▶ Active ──response.done──▶ Completed
//!   ▲                   │
//!   └─ error / timeout ─┘
//! ```
//!
//! Commits and response requests are only sent while `Healthy`, and a new
//! response is only requested when none is outstanding (`Requested` or
//! `Active`).

use base64::prelude::*;
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::RealtimeSessionConfig;
use super::errors::{EngineErrorKind, RealtimeError, RealtimeResult};
use super::messages::{ClientEvent, ServerEvent};
use super::transcript::{Speaker, TranscriptAccumulator};
use crate::core::speech::SpeechSegment;

/// Lifecycle of the engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Configuring,
    Healthy,
    Error(String),
    Closed,
}

/// Lifecycle of the engine's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseState {
    Idle,
    /// Requested but not yet confirmed by the engine.
    Requested { at: Instant },
    /// Confirmed. The id is unknown when the state was inferred from a
    /// conflict error.
    Active { response_id: Option<String> },
    Completed,
    Error,
}

impl ResponseState {
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Requested { .. } | Self::Active { .. })
    }
}

/// Something the rest of the call needs to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    /// The engine accepted the session configuration.
    Ready,
    CommitAcknowledged {
        item_id: String,
    },
    EmptyCommit,
    /// The session is permanently disabled.
    Fatal(String),
    /// A recoverable engine error.
    EngineError(String),
    ResponseStarted {
        response_id: String,
    },
    ResponseFinished {
        response_id: String,
        status: Option<String>,
        transcript: Option<String>,
    },
    /// The transcript of a turn-ending commit is available. `text` is `None`
    /// when nothing was transcribed.
    CallerTurn {
        item_id: String,
        text: Option<String>,
        failed: bool,
    },
    AssistantTranscript {
        response_id: String,
        text: String,
    },
    Audio {
        response_id: String,
        audio: Bytes,
    },
    AudioDone {
        response_id: String,
    },
}

pub struct AiSession {
    config: RealtimeSessionConfig,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    state: SessionState,
    response: ResponseState,
    caller: TranscriptAccumulator,
    assistant: TranscriptAccumulator,
    turn_items: VecDeque<String>,
    responses_requested: u64,
}

impl AiSession {
    pub fn new(config: RealtimeSessionConfig, outbound: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            config,
            outbound,
            state: SessionState::Disconnected,
            response: ResponseState::Idle,
            caller: TranscriptAccumulator::new(Speaker::Caller),
            assistant: TranscriptAccumulator::new(Speaker::Assistant),
            turn_items: VecDeque::new(),
            responses_requested: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.state == SessionState::Healthy
    }

    pub fn response_state(&self) -> &ResponseState {
        &self.response
    }

    pub fn has_outstanding_response(&self) -> bool {
        self.response.is_outstanding()
    }

    pub fn active_response_id(&self) -> Option<&str> {
        match &self.response {
            ResponseState::Active { response_id } => response_id.as_deref(),
            _ => None,
        }
    }

    /// Whether the engine was asked to transcribe caller audio.
    pub fn transcribes_caller(&self) -> bool {
        !self.config.transcription_model.is_empty()
    }

    pub fn responses_requested(&self) -> u64 {
        self.responses_requested
    }

    fn send(&self, event: ClientEvent) -> bool {
        let kind = event.kind();
        if self.outbound.send(event).is_err() {
            warn!(event = kind, "Engine connection gone, dropping outbound event");
            return false;
        }
        true
    }

    pub fn on_connecting(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// The transport is open: send the one configuration message.
    pub fn on_connected(&mut self) {
        if !matches!(self.state, SessionState::Disconnected | SessionState::Connecting) {
            return;
        }
        let session = self.config.session_params();
        info!(
            voice = %session.voice,
            transcription = session.input_audio_transcription.is_some(),
            "Configuring engine session"
        );
        if self.send(ClientEvent::SessionUpdate { session }) {
            self.state = SessionState::Configuring;
        }
    }

    pub fn on_closed(&mut self) {
        if self.state != SessionState::Closed {
            info!(state = ?self.state, "Engine session closed");
        }
        self.state = SessionState::Closed;
        self.response = ResponseState::Idle;
        self.turn_items.clear();
        self.caller.clear();
        self.assistant.clear();
    }

    /// Append a segment to the engine's input buffer and commit it.
    pub fn append_and_commit(&mut self, segment: &SpeechSegment) -> RealtimeResult<()> {
        if !self.is_healthy() {
            return Err(RealtimeError::NotReady(format!("{:?}", self.state)));
        }
        let audio = BASE64_STANDARD.encode(&segment.audio);
        if !self.send(ClientEvent::InputAudioAppend { audio })
            || !self.send(ClientEvent::InputAudioCommit)
        {
            return Err(RealtimeError::Closed);
        }
        debug!(bytes = segment.len(), "Appended and committed caller audio");
        Ok(())
    }

    /// Request a reply unless one is already outstanding.
    pub fn request_response(&mut self, now: Instant) -> bool {
        if !self.is_healthy() {
            debug!("Response request skipped: session not healthy");
            return false;
        }
        if self.response.is_outstanding() {
            debug!(response = ?self.response, "Response request skipped: one is outstanding");
            return false;
        }
        if !self.send(ClientEvent::ResponseCreate) {
            return false;
        }
        self.response = ResponseState::Requested { at: now };
        self.responses_requested += 1;
        debug!("Requested engine response");
        true
    }

    /// Cancel the outstanding response, if any.
    pub fn cancel_response(&mut self) -> bool {
        if !self.response.is_outstanding() {
            return false;
        }
        info!(response_id = ?self.active_response_id(), "Cancelling engine response");
        self.send(ClientEvent::ResponseCancel)
    }

    /// Revert a request the engine never confirmed.
    pub fn expire_stale_request(&mut self, now: Instant) -> bool {
        let ResponseState::Requested { at } = self.response else {
            return false;
        };
        if now.duration_since(at) < self.config.response_request_timeout() {
            return false;
        }
        warn!(
            timeout_ms = self.config.response_request_timeout_ms,
            "Response request was never confirmed, reverting to idle"
        );
        self.response = ResponseState::Idle;
        true
    }

    /// Mark a committed item as the end of a caller turn. Its transcript
    /// completes the turn.
    pub fn mark_turn_item(&mut self, item_id: String) {
        self.turn_items.push_back(item_id);
    }

    fn take_turn_item(&mut self, item_id: &str) -> bool {
        match self.turn_items.iter().position(|id| id == item_id) {
            Some(index) => {
                self.turn_items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Apply one engine event.
    pub fn handle_server_event(&mut self, event: ServerEvent) -> Option<SessionSignal> {
        match event {
            ServerEvent::SessionCreated {} => {
                debug!("Engine session created");
                None
            }
            ServerEvent::SessionUpdated {} => {
                if self.state == SessionState::Configuring {
                    self.state = SessionState::Healthy;
                    info!("Engine session configured");
                    return Some(SessionSignal::Ready);
                }
                None
            }
            ServerEvent::Error { error } => {
                let kind = error.classify();
                match kind {
                    EngineErrorKind::Fatal => {
                        error!(
                            code = ?error.code,
                            param = ?error.param,
                            reason = %error.message,
                            "Fatal engine error, disabling session"
                        );
                        self.state = SessionState::Error(error.message.clone());
                        self.response = ResponseState::Error;
                        Some(SessionSignal::Fatal(error.message))
                    }
                    EngineErrorKind::EmptyCommit => {
                        warn!(reason = %error.message, "Engine reported an empty commit");
                        Some(SessionSignal::EmptyCommit)
                    }
                    EngineErrorKind::ResponseConflict => {
                        warn!(reason = %error.message, "Engine already has an active response");
                        if !matches!(self.response, ResponseState::Active { .. }) {
                            self.response = ResponseState::Active { response_id: None };
                        }
                        None
                    }
                    EngineErrorKind::Transient => {
                        warn!(
                            code = ?error.code,
                            reason = %error.message,
                            "Engine error"
                        );
                        if matches!(self.response, ResponseState::Requested { .. }) {
                            self.response = ResponseState::Idle;
                        }
                        Some(SessionSignal::EngineError(error.message))
                    }
                }
            }
            ServerEvent::InputAudioCommitted { item_id } => {
                debug!(item_id = %item_id, "Commit acknowledged");
                Some(SessionSignal::CommitAcknowledged { item_id })
            }
            ServerEvent::ResponseCreated { response } => {
                debug!(response_id = %response.id, "Response started");
                self.response = ResponseState::Active {
                    response_id: Some(response.id.clone()),
                };
                Some(SessionSignal::ResponseStarted {
                    response_id: response.id,
                })
            }
            ServerEvent::ResponseDone { response } => {
                let transcript = self.assistant.flush();
                if let Some(text) = &transcript {
                    info!(response_id = %response.id, "Assistant: {}", text);
                }
                debug!(response_id = %response.id, status = ?response.status, "Response done");
                self.response = ResponseState::Completed;
                Some(SessionSignal::ResponseFinished {
                    response_id: response.id,
                    status: response.status,
                    transcript,
                })
            }
            ServerEvent::CallerTranscriptDelta { delta, .. } => {
                self.caller.push_delta(&delta);
                None
            }
            ServerEvent::CallerTranscriptCompleted {
                item_id,
                transcript,
            } => {
                self.caller.complete_segment(&transcript);
                if !self.take_turn_item(&item_id) {
                    return None;
                }
                let text = self.caller.flush();
                if let Some(text) = &text {
                    info!(item_id = %item_id, "Caller: {}", text);
                }
                Some(SessionSignal::CallerTurn {
                    item_id,
                    text,
                    failed: false,
                })
            }
            ServerEvent::CallerTranscriptFailed { item_id, error } => {
                warn!(
                    item_id = %item_id,
                    reason = ?error.map(|e| e.message),
                    "Caller transcription failed"
                );
                if !self.take_turn_item(&item_id) {
                    return None;
                }
                Some(SessionSignal::CallerTurn {
                    item_id,
                    text: self.caller.flush(),
                    failed: true,
                })
            }
            ServerEvent::AssistantTranscriptDelta { delta, .. } => {
                self.assistant.push_delta(&delta);
                None
            }
            ServerEvent::AssistantTranscriptDone {
                response_id,
                transcript,
            } => {
                let text = if transcript.trim().is_empty() {
                    self.assistant.partial().trim().to_string()
                } else {
                    transcript.trim().to_string()
                };
                self.assistant.complete_segment(&text);
                Some(SessionSignal::AssistantTranscript { response_id, text })
            }
            ServerEvent::AudioDelta { response_id, delta } => {
                match BASE64_STANDARD.decode(delta.as_bytes()) {
                    Ok(audio) => Some(SessionSignal::Audio {
                        response_id,
                        audio: Bytes::from(audio),
                    }),
                    Err(e) => {
                        warn!(response_id = %response_id, "Undecodable audio delta: {}", e);
                        None
                    }
                }
            }
            ServerEvent::AudioDone { response_id } => Some(SessionSignal::AudioDone { response_id }),
            ServerEvent::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::messages::{EngineErrorBody, ResponseRef};
    use std::time::Duration;

    fn healthy_session() -> (AiSession, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = AiSession::new(RealtimeSessionConfig::default(), tx);
        session.on_connecting();
        session.on_connected();
        assert!(matches!(rx.try_recv(), Ok(ClientEvent::SessionUpdate { .. })));
        assert_eq!(
            session.handle_server_event(ServerEvent::SessionUpdated {}),
            Some(SessionSignal::Ready)
        );
        (session, rx)
    }

    fn error_event(code: &str) -> ServerEvent {
        ServerEvent::Error {
            error: EngineErrorBody {
                kind: Some("invalid_request_error".to_string()),
                code: Some(code.to_string()),
                message: code.to_string(),
                param: None,
            },
        }
    }

    fn response(id: &str) -> ResponseRef {
        ResponseRef {
            id: id.to_string(),
            status: Some("completed".to_string()),
        }
    }

    fn segment(bytes: usize) -> SpeechSegment {
        SpeechSegment {
            audio: Bytes::from(vec![0x7F; bytes]),
            started_at: Instant::now(),
        }
    }

    #[test]
    fn test_healthy_only_after_acknowledgement() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = AiSession::new(RealtimeSessionConfig::default(), tx);
        assert_eq!(session.state(), &SessionState::Disconnected);
        session.on_connected();
        assert_eq!(session.state(), &SessionState::Configuring);
        assert!(!session.is_healthy());
        assert!(session.append_and_commit(&segment(800)).is_err());
        assert!(!session.request_response(Instant::now()));

        session.handle_server_event(ServerEvent::SessionCreated {});
        assert!(!session.is_healthy());
        session.handle_server_event(ServerEvent::SessionUpdated {});
        assert!(session.is_healthy());

        // Only the configuration message went out.
        assert!(matches!(rx.try_recv(), Ok(ClientEvent::SessionUpdate { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_append_and_commit_sends_both_messages() {
        let (mut session, mut rx) = healthy_session();
        session.append_and_commit(&segment(800)).unwrap();
        match rx.try_recv() {
            Ok(ClientEvent::InputAudioAppend { audio }) => {
                assert_eq!(BASE64_STANDARD.decode(audio).unwrap().len(), 800);
            }
            other => panic!("expected append, got {other:?}"),
        }
        assert_eq!(rx.try_recv().ok(), Some(ClientEvent::InputAudioCommit));
    }

    #[test]
    fn test_at_most_one_outstanding_response() {
        let (mut session, mut rx) = healthy_session();
        let now = Instant::now();

        assert!(session.request_response(now));
        assert!(!session.request_response(now));
        session.handle_server_event(ServerEvent::ResponseCreated {
            response: response("resp_1"),
        });
        assert_eq!(session.active_response_id(), Some("resp_1"));
        assert!(!session.request_response(now));

        session.handle_server_event(ServerEvent::ResponseDone {
            response: response("resp_1"),
        });
        assert_eq!(session.response_state(), &ResponseState::Completed);
        assert!(session.request_response(now));

        let creates = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| *e == ClientEvent::ResponseCreate)
            .count();
        assert_eq!(creates, 2);
        assert_eq!(session.responses_requested(), 2);
    }

    #[test]
    fn test_unconfirmed_request_reverts_after_timeout() {
        let (mut session, _rx) = healthy_session();
        let now = Instant::now();
        session.request_response(now);

        assert!(!session.expire_stale_request(now + Duration::from_millis(4_999)));
        assert!(session.has_outstanding_response());
        assert!(session.expire_stale_request(now + Duration::from_millis(5_000)));
        assert_eq!(session.response_state(), &ResponseState::Idle);
    }

    #[test]
    fn test_transient_error_reverts_request() {
        let (mut session, _rx) = healthy_session();
        session.request_response(Instant::now());
        assert!(matches!(
            session.handle_server_event(error_event("server_error")),
            Some(SessionSignal::EngineError(_))
        ));
        assert_eq!(session.response_state(), &ResponseState::Idle);
    }

    #[test]
    fn test_fatal_error_disables_session() {
        let (mut session, mut rx) = healthy_session();
        assert!(matches!(
            session.handle_server_event(error_event("unknown_parameter")),
            Some(SessionSignal::Fatal(_))
        ));
        assert!(matches!(session.state(), SessionState::Error(_)));
        assert!(session.append_and_commit(&segment(1_600)).is_err());
        assert!(!session.request_response(Instant::now()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_conflict_marks_response_active() {
        let (mut session, _rx) = healthy_session();
        assert_eq!(
            session.handle_server_event(error_event("conversation_already_has_active_response")),
            None
        );
        assert_eq!(
            session.response_state(),
            &ResponseState::Active { response_id: None }
        );
        assert!(session.cancel_response());
    }

    #[test]
    fn test_empty_commit_signal() {
        let (mut session, _rx) = healthy_session();
        assert_eq!(
            session.handle_server_event(error_event("input_audio_buffer_commit_empty")),
            Some(SessionSignal::EmptyCommit)
        );
        assert!(session.is_healthy());
    }

    #[test]
    fn test_caller_turn_waits_for_turn_item() {
        let (mut session, _rx) = healthy_session();

        // A trickle item transcribes without ending the turn.
        assert_eq!(
            session.handle_server_event(ServerEvent::CallerTranscriptCompleted {
                item_id: "item_1".to_string(),
                transcript: "I would like".to_string(),
            }),
            None
        );

        session.mark_turn_item("item_2".to_string());
        assert_eq!(
            session.handle_server_event(ServerEvent::CallerTranscriptCompleted {
                item_id: "item_2".to_string(),
                transcript: "to book a table".to_string(),
            }),
            Some(SessionSignal::CallerTurn {
                item_id: "item_2".to_string(),
                text: Some("I would like to book a table".to_string()),
                failed: false,
            })
        );
    }

    #[test]
    fn test_failed_turn_transcription() {
        let (mut session, _rx) = healthy_session();
        session.mark_turn_item("item_1".to_string());
        assert_eq!(
            session.handle_server_event(ServerEvent::CallerTranscriptFailed {
                item_id: "item_1".to_string(),
                error: None,
            }),
            Some(SessionSignal::CallerTurn {
                item_id: "item_1".to_string(),
                text: None,
                failed: true,
            })
        );
    }

    #[test]
    fn test_assistant_transcript_flushed_at_response_done() {
        let (mut session, _rx) = healthy_session();
        session.handle_server_event(ServerEvent::ResponseCreated {
            response: response("resp_1"),
        });
        session.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            response_id: "resp_1".to_string(),
            delta: "Hello ".to_string(),
        });
        session.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            response_id: "resp_1".to_string(),
            delta: "there".to_string(),
        });
        assert_eq!(
            session.handle_server_event(ServerEvent::AssistantTranscriptDone {
                response_id: "resp_1".to_string(),
                transcript: String::new(),
            }),
            Some(SessionSignal::AssistantTranscript {
                response_id: "resp_1".to_string(),
                text: "Hello there".to_string(),
            })
        );
        match session.handle_server_event(ServerEvent::ResponseDone {
            response: response("resp_1"),
        }) {
            Some(SessionSignal::ResponseFinished { transcript, .. }) => {
                assert_eq!(transcript.as_deref(), Some("Hello there"));
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn test_audio_delta_is_decoded() {
        let (mut session, _rx) = healthy_session();
        assert_eq!(
            session.handle_server_event(ServerEvent::AudioDelta {
                response_id: "resp_1".to_string(),
                delta: BASE64_STANDARD.encode([0xFF, 0x7F]),
            }),
            Some(SessionSignal::Audio {
                response_id: "resp_1".to_string(),
                audio: Bytes::from_static(&[0xFF, 0x7F]),
            })
        );
        assert_eq!(
            session.handle_server_event(ServerEvent::AudioDelta {
                response_id: "resp_1".to_string(),
                delta: "***".to_string(),
            }),
            None
        );
    }

    #[test]
    fn test_closed_drops_outbound() {
        let (mut session, rx) = healthy_session();
        drop(rx);
        session.on_closed();
        assert_eq!(session.state(), &SessionState::Closed);
        assert!(!session.request_response(Instant::now()));
    }
}
