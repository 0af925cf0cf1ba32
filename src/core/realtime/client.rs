//! WebSocket connection task for the realtime engine.
//!
//! The connection runs in its own task and talks to the call only through
//! channels:
//!
//! ```text
//! ┌─────────────┐  ClientEvent (mpsc)  ┌────────────────┐
//! │  AiSession  │─────────────────────▶│                │
//! └─────────────┘                      │ WebSocket Task │◀──▶ engine
//! ┌─────────────┐  EngineEvent (mpsc)  │                │
//! │ CallSession │◀─────────────────────│                │
//! └─────────────┘                      └────────────────┘
//! ```

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::config::RealtimeConnectionConfig;
use super::errors::RealtimeError;
use super::messages::{ClientEvent, ServerEvent};

/// What the connection task reports back to the call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The WebSocket handshake completed.
    Connected,
    Server(ServerEvent),
    /// The engine closed the connection.
    Closed(Option<String>),
    /// The connection could not be established or broke.
    Failed(String),
}

/// Handle on a running engine connection. Dropping it shuts the task down.
pub struct RealtimeConnection {
    events: mpsc::UnboundedReceiver<EngineEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RealtimeConnection {
    /// Next event from the connection task. `None` once the task is gone.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Ask the task to close the WebSocket and exit.
    pub fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }

    /// Shut down and wait for the task to finish.
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Engine connection task ended abnormally: {}", e);
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct RealtimeClient;

impl RealtimeClient {
    pub(crate) fn build_request(config: &RealtimeConnectionConfig) -> Result<Request<()>, RealtimeError> {
        Request::builder()
            .method("GET")
            .uri(config.endpoint())
            .header("Host", config.host())
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .body(())
            .map_err(|e| {
                RealtimeError::ConnectionFailed(format!("Failed to create WebSocket request: {e}"))
            })
    }

    /// Handle one inbound frame. Returns false when the connection is done.
    pub(crate) fn handle_websocket_message(
        message: Message,
        events_tx: &mpsc::UnboundedSender<EngineEvent>,
    ) -> bool {
        match message {
            Message::Text(text) => {
                match ServerEvent::parse(&text) {
                    Ok(ServerEvent::Unknown) => {}
                    Ok(event) => {
                        let _ = events_tx.send(EngineEvent::Server(event));
                    }
                    Err(e) => warn!("Unparseable engine message: {}", e),
                }
                true
            }
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.as_str().to_owned());
                info!(reason = ?reason, "Engine closed the connection");
                let _ = events_tx.send(EngineEvent::Closed(reason));
                false
            }
            Message::Binary(data) => {
                debug!(bytes = data.len(), "Ignoring binary engine frame");
                true
            }
            _ => true,
        }
    }

    /// Spawn the connection task. Outbound events queued on `outbound_rx`
    /// before the handshake completes are sent once it does.
    pub fn connect(
        config: RealtimeConnectionConfig,
        mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> RealtimeConnection {
        let (events_tx, events_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let request = match Self::build_request(&config) {
                Ok(request) => request,
                Err(e) => {
                    error!("{}", e);
                    let _ = events_tx.send(EngineEvent::Failed(e.to_string()));
                    return;
                }
            };

            let connecting = tokio::select! {
                result = connect_async(request) => result,
                _ = &mut shutdown_rx => {
                    debug!("Engine connection cancelled before handshake");
                    return;
                }
            };
            let (ws_stream, _response) = match connecting {
                Ok(result) => result,
                Err(e) => {
                    let err = RealtimeError::ConnectionFailed(format!(
                        "Failed to connect to realtime engine: {e}"
                    ));
                    error!("{}", err);
                    let _ = events_tx.send(EngineEvent::Failed(err.to_string()));
                    return;
                }
            };

            info!(model = %config.model, "Connected to realtime engine");
            let _ = events_tx.send(EngineEvent::Connected);

            let (mut ws_sink, mut ws_stream) = ws_stream.split();

            loop {
                tokio::select! {
                    Some(event) = outbound_rx.recv() => {
                        let kind = event.kind();
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(event = kind, "Failed to serialize engine event: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            let err = RealtimeError::NetworkError(format!(
                                "Failed to send {kind} to engine: {e}"
                            ));
                            error!("{}", err);
                            let _ = events_tx.send(EngineEvent::Failed(err.to_string()));
                            break;
                        }
                        debug!(event = kind, "Sent engine event");
                    }

                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                if !Self::handle_websocket_message(msg, &events_tx) {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                let err = RealtimeError::NetworkError(format!("WebSocket error: {e}"));
                                error!("{}", err);
                                let _ = events_tx.send(EngineEvent::Failed(err.to_string()));
                                break;
                            }
                            None => {
                                info!("Engine WebSocket stream ended");
                                let _ = events_tx.send(EngineEvent::Closed(None));
                                break;
                            }
                        }
                    }

                    _ = &mut shutdown_rx => {
                        info!("Shutting down engine connection");
                        // Deliver whatever the call queued on its way out (e.g. the stop commit).
                        while let Ok(event) = outbound_rx.try_recv() {
                            let Ok(json) = serde_json::to_string(&event) else {
                                continue;
                            };
                            if ws_sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            debug!("Engine connection task finished");
        });

        RealtimeConnection {
            events: events_rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}
