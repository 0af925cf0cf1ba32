//! Axum WebSocket handler for the telephony media stream
//!
//! The socket is split: a sender task serializes outbound commands, while the
//! handler reads inbound frames, waits for `start`, then spawns the call runner
//! and forwards every later event to it.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::call::{TransportCommand, TransportEvent, run_call_session};
use crate::state::AppState;

use super::error::{MediaStreamError, MediaStreamResult};
use super::messages::{InboundMessage, OutboundMessage, StartInfo};

/// Media-stream handler
/// Upgrades the HTTP connection to a WebSocket carrying one call
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Media stream upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

/// Read frames until the stream starts. `Ok(None)` if the caller hung up first.
async fn wait_for_start<S>(receiver: &mut S) -> MediaStreamResult<Option<StartInfo>>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(message) = receiver.next().await {
        let text = match message.map_err(|e| MediaStreamError::WebSocket(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(None),
            _ => continue,
        };
        match InboundMessage::parse(text.as_str())? {
            InboundMessage::Connected { protocol, .. } => {
                debug!(protocol = ?protocol, "Media stream connected");
            }
            InboundMessage::Start { start } => return Ok(Some(start)),
            InboundMessage::Stop { .. } => return Ok(None),
            other => debug!(event = ?other, "Ignoring message before start"),
        }
    }
    Ok(None)
}

/// Convert one socket frame into a call event.
///
/// Returns `Err` only for frames that cannot be interpreted; the caller logs
/// them and keeps reading.
fn process_message(message: Message) -> MediaStreamResult<Option<TransportEvent>> {
    match message {
        Message::Text(text) => match InboundMessage::parse(text.as_str())? {
            InboundMessage::Start { start } => {
                warn!(stream_sid = %start.stream_sid, "Duplicate start ignored");
                Ok(None)
            }
            message => message.into_transport_event(),
        },
        Message::Close(_) => Ok(Some(TransportEvent::Stop)),
        Message::Binary(data) => {
            debug!("Ignoring binary frame: {} bytes", data.len());
            Ok(None)
        }
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}

async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let start = match wait_for_start(&mut receiver).await {
        Ok(Some(start)) => start,
        Ok(None) => {
            info!("{}", MediaStreamError::NotStarted);
            return;
        }
        Err(e) => {
            warn!("Media stream failed before start: {}", e);
            return;
        }
    };
    info!(
        stream_sid = %start.stream_sid,
        call_sid = %start.call_sid,
        "Media stream started"
    );

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<TransportCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();

    // Outbound frames, in enqueue order. Ends once the call drops its sender.
    let stream_sid = start.stream_sid.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let message = OutboundMessage::from_command(&stream_sid, command);
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                warn!("Failed to send media stream message: {}", e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    let call = tokio::spawn(run_call_session(
        start.stream_sid.clone(),
        start.call_sid.clone(),
        app_state.call_dependencies(),
        event_rx,
        command_tx,
    ));

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Media stream socket error: {}", e);
                break;
            }
        };
        match process_message(message) {
            Ok(Some(event)) => {
                let stop = event == TransportEvent::Stop;
                // The call is gone once its receiver is dropped.
                if event_tx.send(event).is_err() || stop {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(stream_sid = %start.stream_sid, "{}", e),
        }
    }
    drop(event_tx);

    match call.await {
        Ok(Ok(summary)) => info!(
            stream_sid = %summary.stream_sid,
            duration_ms = summary.duration.as_millis() as u64,
            commits = summary.commits,
            "Call completed"
        ),
        Ok(Err(e)) => warn!(stream_sid = %start.stream_sid, "Call ended with error: {}", e),
        Err(e) => error!(stream_sid = %start.stream_sid, "Call task panicked: {}", e),
    }

    if let Err(e) = sender_task.await {
        error!("Media stream sender task failed: {}", e);
    }
    info!(stream_sid = %start.stream_sid, "Media stream terminated");
}
