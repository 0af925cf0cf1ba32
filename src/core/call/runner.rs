use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, warn};

use super::config::BridgeConfig;
use super::errors::{BridgeResult, TeardownReason};
use super::session::{
    CallChannels, CallSession, CallSummary, SynthesisOutcome, SynthesisRequest, TransportCommand,
};
use crate::core::realtime::{EngineEvent, RealtimeClient, RealtimeConnectionConfig};
use crate::core::synthesis::SpeechSynthesizer;

/// Inbound event from the telephony transport. Closing the channel means the
/// transport went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Decoded caller audio.
    Media(Bytes),
    /// The transport played everything up to this mark.
    Mark(String),
    /// The call ended.
    Stop,
}

/// Shared services a call needs.
#[derive(Clone)]
pub struct CallDependencies {
    pub config: Arc<BridgeConfig>,
    pub engine: RealtimeConnectionConfig,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Drive one call until the transport stops or the engine fails.
///
/// Connects to the engine, then multiplexes transport events, engine events,
/// synthesis results and the two timers into the call session.
pub async fn run_call_session(
    stream_sid: String,
    call_sid: String,
    deps: CallDependencies,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    transport_tx: mpsc::UnboundedSender<TransportCommand>,
) -> BridgeResult<CallSummary> {
    let CallDependencies {
        config,
        engine,
        synthesizer,
    } = deps;

    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let (synthesis_tx, mut synthesis_rx) = mpsc::unbounded_channel::<SynthesisRequest>();
    let mut connection = RealtimeClient::connect(engine, engine_rx);

    let mut session = CallSession::start(
        stream_sid,
        call_sid,
        config.clone(),
        CallChannels {
            engine: engine_tx,
            transport: transport_tx,
            synthesis: synthesis_tx,
        },
        Instant::now(),
    );

    let mut synthesis_tasks: JoinSet<SynthesisOutcome> = JoinSet::new();

    let mut schedule = interval(config.turn.vad_tick());
    schedule.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pacing = interval(config.pacer.frame_interval());
    pacing.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !session.is_closed() {
        tokio::select! {
            event = transport_rx.recv() => {
                let now = Instant::now();
                match event {
                    Some(TransportEvent::Media(payload)) => session.on_media(&payload, now),
                    Some(TransportEvent::Mark(name)) => session.on_transport_mark(&name),
                    Some(TransportEvent::Stop) => session.teardown(TeardownReason::Stopped, now),
                    None => session.teardown(TeardownReason::TransportClosed, now),
                }
            }

            event = connection.recv() => {
                let event = event.unwrap_or(EngineEvent::Closed(None));
                session.on_engine_event(event, Instant::now());
            }

            Some(request) = synthesis_rx.recv() => {
                let synthesizer = synthesizer.clone();
                synthesis_tasks.spawn(async move {
                    let result = synthesizer.synthesize(&request.text).await;
                    SynthesisOutcome {
                        utterance_id: request.utterance_id,
                        result,
                    }
                });
            }

            Some(joined) = synthesis_tasks.join_next() => {
                match joined {
                    Ok(outcome) => session.on_synthesis(outcome, Instant::now()),
                    Err(e) => warn!("Synthesis task ended abnormally: {}", e),
                }
            }

            _ = schedule.tick() => session.on_schedule_tick(Instant::now()),

            _ = pacing.tick() => session.on_pacer_tick(),
        }
    }

    synthesis_tasks.abort_all();
    connection.close().await;
    debug!(stream_sid = %session.stream_sid(), "Call runner finished");

    match session.failure() {
        Some(error) => Err(error.clone()),
        None => Ok(session.summary()),
    }
}
