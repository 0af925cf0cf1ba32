//! Call scenarios driven through the session handlers with a synthetic clock.

use base64::prelude::*;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::config::BridgeConfig;
use super::errors::{BridgeError, TeardownReason};
use super::session::{CallChannels, CallSession, CallState, SynthesisOutcome, SynthesisRequest, TransportCommand};
use crate::core::codec::{FRAME_BYTES, MULAW_SILENCE, ms_to_bytes};
use crate::core::realtime::messages::{EngineErrorBody, ResponseRef};
use crate::core::realtime::{ClientEvent, EngineEvent, ServerEvent};
use crate::core::speech::CommitCause;
use crate::core::synthesis::SynthesisError;
use crate::core::turn::ResponseMode;

const LOUD: [u8; FRAME_BYTES] = [0x00; FRAME_BYTES];
const QUIET: [u8; FRAME_BYTES] = [MULAW_SILENCE; FRAME_BYTES];

struct Harness {
    session: CallSession,
    engine_rx: mpsc::UnboundedReceiver<ClientEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportCommand>,
    synthesis_rx: mpsc::UnboundedReceiver<SynthesisRequest>,
    now: Instant,
}

impl Harness {
    fn new(config: BridgeConfig) -> Self {
        let (engine, engine_rx) = mpsc::unbounded_channel();
        let (transport, transport_rx) = mpsc::unbounded_channel();
        let (synthesis, synthesis_rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let session = CallSession::start(
            "MZ123",
            "CA123",
            Arc::new(config),
            CallChannels {
                engine,
                transport,
                synthesis,
            },
            now,
        );
        let mut harness = Self {
            session,
            engine_rx,
            transport_rx,
            synthesis_rx,
            now,
        };
        harness.session.on_engine_event(EngineEvent::Connected, now);
        harness.server(ServerEvent::SessionUpdated {});
        assert_eq!(harness.engine(), vec!["session.update"]);
        harness
    }

    fn without_trickle(mut config: BridgeConfig) -> Self {
        config.commit.trickle_enabled = false;
        Self::new(config)
    }

    fn server(&mut self, event: ServerEvent) {
        self.session
            .on_engine_event(EngineEvent::Server(event), self.now);
    }

    /// Feed `ms` of caller audio, running the scheduler every 100 ms.
    fn feed(&mut self, frame: &[u8], ms: u64) {
        for i in 0..(ms / 20) {
            self.session.on_media(frame, self.now);
            self.now += Duration::from_millis(20);
            if (i + 1) % 5 == 0 {
                self.session.on_schedule_tick(self.now);
            }
        }
    }

    fn ack(&mut self, item_id: &str) {
        self.server(ServerEvent::InputAudioCommitted {
            item_id: item_id.to_string(),
        });
    }

    fn engine(&mut self) -> Vec<&'static str> {
        std::iter::from_fn(|| self.engine_rx.try_recv().ok())
            .map(|e| e.kind())
            .collect()
    }

    fn transport(&mut self) -> Vec<TransportCommand> {
        std::iter::from_fn(|| self.transport_rx.try_recv().ok()).collect()
    }

    fn response_created(&mut self, id: &str) {
        self.server(ServerEvent::ResponseCreated {
            response: ResponseRef {
                id: id.to_string(),
                status: None,
            },
        });
    }

    fn response_done(&mut self, id: &str) {
        self.server(ServerEvent::ResponseDone {
            response: ResponseRef {
                id: id.to_string(),
                status: Some("completed".to_string()),
            },
        });
    }

    fn audio(&mut self, id: &str, audio: &[u8]) {
        self.server(ServerEvent::AudioDelta {
            response_id: id.to_string(),
            delta: BASE64_STANDARD.encode(audio),
        });
    }

    fn transcript(&mut self, id: &str, text: &str) {
        self.server(ServerEvent::AssistantTranscriptDone {
            response_id: id.to_string(),
            transcript: text.to_string(),
        });
    }
}

fn media_frames(commands: &[TransportCommand]) -> Vec<Bytes> {
    commands
        .iter()
        .filter_map(|c| match c {
            TransportCommand::Media(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_becomes_active_when_engine_ready() {
    let harness = Harness::new(BridgeConfig::default());
    assert_eq!(harness.session.state(), CallState::Active);
    assert!(harness.session.ai().is_healthy());
}

#[test]
fn test_silent_caller_never_commits() {
    let mut h = Harness::new(BridgeConfig::default());
    h.feed(&QUIET, 10_000);
    assert!(h.session.orchestrator().commits().is_empty());
    assert!(h.engine().is_empty());
    assert!(h.session.orchestrator().buffer().is_empty());
}

#[test]
fn test_continuous_speech_commits_at_max_turn() {
    let mut h = Harness::without_trickle(BridgeConfig::default());
    h.feed(&LOUD, 15_100);

    let commits = h.session.orchestrator().commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].cause, CommitCause::MaxDuration);
    assert!(commits[0].respond);
    assert!(commits[0].bytes >= ms_to_bytes(15_000));
    assert_eq!(
        h.engine(),
        vec!["input_audio_buffer.append", "input_audio_buffer.commit", "response.create"]
    );
    // A fresh turn started with the speech that followed.
    assert!(h.session.orchestrator().buffer().len() <= ms_to_bytes(200));
}

#[test]
fn test_trickle_commits_never_request_response() {
    let mut h = Harness::new(BridgeConfig::default());
    for i in 0..4 {
        h.feed(&LOUD, 1_000);
        h.ack(&format!("item_{i}"));
    }

    let commits = h.session.orchestrator().commits();
    assert!(commits.len() >= 2);
    assert!(
        commits
            .iter()
            .all(|c| c.cause == CommitCause::Trickle && !c.respond)
    );
    assert!(!h.engine().contains(&"response.create"));
}

#[test]
fn test_at_most_one_outstanding_response() {
    let mut h = Harness::without_trickle(BridgeConfig::default());

    h.feed(&LOUD, 400);
    h.feed(&QUIET, 800);
    h.ack("item_1");
    h.feed(&LOUD, 400);
    h.feed(&QUIET, 800);

    let commits = h.session.orchestrator().commits();
    assert_eq!(commits.len(), 2);
    assert!(commits[0].respond);
    assert!(!commits[1].respond);
    let creates = h.engine().iter().filter(|k| **k == "response.create").count();
    assert_eq!(creates, 1);
    assert_eq!(h.session.ai().responses_requested(), 1);
}

#[test]
fn test_empty_commit_backs_off_then_resumes() {
    let mut h = Harness::without_trickle(BridgeConfig::default());

    h.feed(&LOUD, 400);
    h.feed(&QUIET, 800);
    assert_eq!(h.session.orchestrator().commits().len(), 1);

    h.server(ServerEvent::Error {
        error: EngineErrorBody {
            kind: Some("invalid_request_error".to_string()),
            code: Some("input_audio_buffer_commit_empty".to_string()),
            message: "buffer too small".to_string(),
            param: None,
        },
    });
    assert!(h.session.orchestrator().gate().in_backoff(h.now));
    assert!(!h.session.orchestrator().gate().is_in_flight());

    // The next turn ends inside the backoff window.
    h.feed(&LOUD, 400);
    h.feed(&QUIET, 800);
    assert_eq!(h.session.orchestrator().commits().len(), 1);

    h.feed(&QUIET, 600);
    let commits = h.session.orchestrator().commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].cause, CommitCause::Silence);
}

#[test]
fn test_engine_audio_is_framed_and_marked() {
    let mut h = Harness::new(BridgeConfig::default());
    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; 100]);
    h.audio("resp_1", &[0x20; 250]);
    h.server(ServerEvent::AudioDone {
        response_id: "resp_1".to_string(),
    });
    h.transcript("resp_1", "Hello, how can I help?");

    for _ in 0..5 {
        h.session.on_pacer_tick();
    }
    let commands = h.transport();
    let frames = media_frames(&commands);
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.len() == FRAME_BYTES));
    assert_eq!(&frames[0][..100], &[0x10; 100][..]);
    assert_eq!(&frames[0][100..], &[0x20; 60][..]);
    assert_eq!(&frames[1][..], &[0x20; FRAME_BYTES][..]);
    assert_eq!(&frames[2][..30], &[0x20; 30][..]);
    assert!(frames[2][30..].iter().all(|&b| b == MULAW_SILENCE));
    assert_eq!(
        commands.last(),
        Some(&TransportCommand::Mark("resp_1".to_string()))
    );

    assert_eq!(h.session.pending_marks(), 1);
    h.session.on_transport_mark("resp_1");
    assert_eq!(h.session.pending_marks(), 0);
}

#[test]
fn test_reply_waits_for_its_transcript() {
    let mut h = Harness::new(BridgeConfig::default());
    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 8]);
    for _ in 0..5 {
        h.session.on_pacer_tick();
    }
    assert!(media_frames(&h.transport()).is_empty());

    h.transcript("resp_1", "Happy to help with that.");
    h.session.on_pacer_tick();
    assert_eq!(media_frames(&h.transport()).len(), 1);
}

#[test]
fn test_reply_without_transcript_plays_when_done() {
    let mut h = Harness::new(BridgeConfig::default());
    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 4]);
    h.server(ServerEvent::AudioDone {
        response_id: "resp_1".to_string(),
    });
    h.response_done("resp_1");

    for _ in 0..6 {
        h.session.on_pacer_tick();
    }
    let commands = h.transport();
    assert_eq!(media_frames(&commands).len(), 4);
    assert_eq!(
        commands.last(),
        Some(&TransportCommand::Mark("resp_1".to_string()))
    );
}

#[test]
fn test_repeated_reply_is_never_spoken() {
    let mut h = Harness::new(BridgeConfig::default());

    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 2]);
    h.server(ServerEvent::AudioDone {
        response_id: "resp_1".to_string(),
    });
    h.transcript("resp_1", "Sure, one moment please.");
    h.response_done("resp_1");
    for _ in 0..4 {
        h.session.on_pacer_tick();
    }
    assert_eq!(media_frames(&h.transport()).len(), 2);
    h.engine();

    // The same reply again, streamed while the pacer keeps ticking.
    h.response_created("resp_2");
    for _ in 0..25 {
        h.audio("resp_2", &[0x20; FRAME_BYTES]);
        h.session.on_pacer_tick();
    }
    h.audio("resp_2", &[0x20; FRAME_BYTES * 15]);
    assert!(media_frames(&h.transport()).is_empty());

    h.transcript("resp_2", "sure, one moment   please.");
    assert_eq!(h.engine(), vec!["response.cancel"]);
    assert!(!h.session.pacer().is_held());
    assert_eq!(h.session.pacer().queued_frames(), 0);

    // Late audio for the dropped response stays dropped.
    h.audio("resp_2", &[0x20; FRAME_BYTES * 4]);
    h.server(ServerEvent::AudioDone {
        response_id: "resp_2".to_string(),
    });
    h.response_done("resp_2");
    for _ in 0..10 {
        h.session.on_pacer_tick();
    }
    assert!(media_frames(&h.transport()).is_empty());
    assert!(!h.session.pacer().has_pending_audio());
    assert_eq!(h.session.summary().replies_suppressed, 1);
}

#[test]
fn test_repeated_reply_keeps_earlier_audio() {
    let mut h = Harness::new(BridgeConfig::default());

    h.response_created("resp_1");
    h.transcript("resp_1", "Let me check.");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 6]);
    h.server(ServerEvent::AudioDone {
        response_id: "resp_1".to_string(),
    });
    h.response_done("resp_1");

    h.response_created("resp_2");
    h.audio("resp_2", &[0x20; FRAME_BYTES * 6]);
    h.transcript("resp_2", "Let me check.");

    // Only the first reply is left, and the transport is not cleared.
    let mut commands = Vec::new();
    for _ in 0..10 {
        h.session.on_pacer_tick();
        commands.extend(h.transport());
    }
    let frames = media_frames(&commands);
    assert_eq!(frames.len(), 6);
    assert!(frames.iter().all(|f| f.iter().all(|&b| b == 0x10)));
    assert!(!commands.contains(&TransportCommand::Clear));
}

#[test]
fn test_queue_cap_and_burst_limit() {
    let mut config = BridgeConfig::default();
    config.pacer.max_queue_frames = 20;
    config.pacer.high_water_frames = 10;
    config.pacer.max_burst_frames = 3;
    let mut h = Harness::new(config);

    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 30]);
    assert_eq!(h.session.pacer().queued_frames(), 20);
    assert_eq!(h.session.pacer().frames_dropped(), 10);
    h.transcript("resp_1", "Here is a long answer.");

    h.session.on_pacer_tick();
    assert_eq!(media_frames(&h.transport()).len(), 3);

    // Drain to the high-water mark, then one frame per tick.
    while h.session.pacer().queued_frames() > 10 {
        h.session.on_pacer_tick();
        assert!(media_frames(&h.transport()).len() <= 3);
    }
    h.session.on_pacer_tick();
    assert_eq!(media_frames(&h.transport()).len(), 1);
}

#[test]
fn test_barge_in_stops_playback() {
    let mut config = BridgeConfig::default();
    config.turn.barge_in_enabled = true;
    let mut h = Harness::new(config);

    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 10]);
    h.engine();

    h.session.on_media(&LOUD, h.now);
    assert_eq!(h.transport(), vec![TransportCommand::Clear]);
    assert_eq!(h.engine(), vec!["response.cancel"]);
    assert_eq!(h.session.pacer().queued_frames(), 0);

    h.audio("resp_1", &[0x10; FRAME_BYTES * 10]);
    assert_eq!(h.session.pacer().queued_frames(), 0);
}

#[test]
fn test_caller_speech_does_not_interrupt_without_barge_in() {
    let mut h = Harness::new(BridgeConfig::default());
    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 10]);
    h.engine();

    h.session.on_media(&LOUD, h.now);
    assert!(h.transport().is_empty());
    assert!(h.engine().is_empty());
    assert_eq!(h.session.pacer().queued_frames(), 10);
}

#[test]
fn test_local_first_greeting_is_synthesized() {
    let mut config = BridgeConfig::default();
    config.turn.response_mode = ResponseMode::LocalFirst;
    let mut h = Harness::without_trickle(config);

    h.feed(&LOUD, 400);
    h.feed(&QUIET, 800);
    assert!(!h.engine().contains(&"response.create"));

    h.ack("item_1");
    h.server(ServerEvent::CallerTranscriptCompleted {
        item_id: "item_1".to_string(),
        transcript: "Hello there".to_string(),
    });

    let request = h.synthesis_rx.try_recv().unwrap();
    assert_eq!(request.utterance_id, "local-1");
    assert_eq!(request.text, "Hi there! How can I help you today?");

    let now = h.now;
    h.session.on_synthesis(
        SynthesisOutcome {
            utterance_id: request.utterance_id,
            result: Ok(vec![0x10; FRAME_BYTES * 2]),
        },
        now,
    );
    for _ in 0..3 {
        h.session.on_pacer_tick();
    }
    let commands = h.transport();
    assert_eq!(media_frames(&commands).len(), 2);
    assert_eq!(
        commands.last(),
        Some(&TransportCommand::Mark("local-1".to_string()))
    );
}

#[test]
fn test_late_trickle_ack_keeps_turn_commit() {
    let mut config = BridgeConfig::default();
    config.turn.response_mode = ResponseMode::LocalFirst;
    let mut h = Harness::new(config);

    // A trickle goes out mid-speech and its acknowledgement is delayed past
    // the timeout, which lets the turn commit through.
    h.feed(&LOUD, 600);
    h.feed(&QUIET, 3_000);
    let causes: Vec<CommitCause> = h
        .session
        .orchestrator()
        .commits()
        .iter()
        .map(|c| c.cause)
        .collect();
    assert_eq!(causes, vec![CommitCause::Trickle, CommitCause::Silence]);
    assert!(!h.engine().contains(&"response.create"));

    h.ack("item_1");
    assert!(h.session.orchestrator().gate().is_in_flight());
    h.ack("item_2");
    h.server(ServerEvent::CallerTranscriptCompleted {
        item_id: "item_2".to_string(),
        transcript: "What time do you close?".to_string(),
    });
    assert_eq!(h.engine(), vec!["response.create"]);
}

#[test]
fn test_failed_synthesis_falls_back_to_engine() {
    let mut config = BridgeConfig::default();
    config.turn.response_mode = ResponseMode::LocalFirst;
    let mut h = Harness::new(config);

    let now = h.now;
    h.session.on_synthesis(
        SynthesisOutcome {
            utterance_id: "local-1".to_string(),
            result: Err(SynthesisError::EmptyAudio),
        },
        now,
    );
    assert_eq!(h.engine(), vec!["response.create"]);
}

#[test]
fn test_fatal_engine_error_ends_call() {
    let mut h = Harness::new(BridgeConfig::default());
    h.server(ServerEvent::Error {
        error: EngineErrorBody {
            kind: Some("invalid_request_error".to_string()),
            code: Some("invalid_value".to_string()),
            message: "Invalid voice".to_string(),
            param: Some("session.voice".to_string()),
        },
    });
    assert_eq!(h.session.state(), CallState::Closed);
    assert_eq!(
        h.session.failure(),
        Some(&BridgeError::EngineFatal("Invalid voice".to_string()))
    );
}

#[test]
fn test_engine_close_ends_call() {
    let mut h = Harness::new(BridgeConfig::default());
    let now = h.now;
    h.session
        .on_engine_event(EngineEvent::Closed(Some("idle".to_string())), now);
    assert!(h.session.is_closed());
    assert_eq!(
        h.session.failure(),
        Some(&BridgeError::EngineClosed(Some("idle".to_string())))
    );
}

#[test]
fn test_teardown_flushes_and_quiesces() {
    let mut h = Harness::new(BridgeConfig::default());
    h.response_created("resp_1");
    h.audio("resp_1", &[0x10; FRAME_BYTES * 10]);
    h.feed(&LOUD, 400);
    h.engine();

    let now = h.now;
    h.session.teardown(TeardownReason::Stopped, now);
    assert_eq!(h.session.state(), CallState::Closed);
    assert!(h.session.failure().is_none());
    assert_eq!(h.session.pacer().queued_frames(), 0);
    assert!(h.session.pacer().is_destroyed());
    assert_eq!(
        h.session.orchestrator().commits().last().map(|c| c.cause),
        Some(CommitCause::Stop)
    );
    assert_eq!(
        h.engine(),
        vec!["input_audio_buffer.append", "input_audio_buffer.commit"]
    );

    // Every handler is inert afterwards.
    let commits = h.session.orchestrator().commits().len();
    h.feed(&LOUD, 2_000);
    h.session.on_pacer_tick();
    h.audio("resp_1", &[0x10; FRAME_BYTES * 10]);
    h.session.teardown(TeardownReason::TransportClosed, now);
    assert_eq!(h.session.orchestrator().commits().len(), commits);
    assert_eq!(h.session.pacer().queued_frames(), 0);
    assert!(h.transport().is_empty());
    assert!(h.engine().is_empty());
}
