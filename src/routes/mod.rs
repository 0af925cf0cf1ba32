pub mod api;
pub mod webhooks;
pub mod ws;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Every route the server exposes.
pub fn create_app(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(webhooks::create_webhook_router())
        .merge(ws::create_ws_router())
        .with_state(state)
}
