use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream router
///
/// The `/media-stream` endpoint is unauthenticated. It is reached only through the
/// URL handed out by the call-setup webhook; protect it at the network layer if needed.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
