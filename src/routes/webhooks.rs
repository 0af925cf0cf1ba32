use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::voice_webhook;
use crate::state::AppState;

/// Create the router for telephony webhooks
///
/// These routes are called by the telephony provider when a call comes in.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice", post(voice_webhook::voice_webhook_handler))
        .layer(TraceLayer::new_for_http())
}
