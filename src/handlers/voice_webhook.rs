//! Call-setup webhook
//!
//! The telephony provider requests this document when a call comes in. It
//! tells the provider to open a bidirectional media stream to `/media-stream`.

use axum::{
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

/// Escape text for use in XML content and attribute values.
fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Render the call-setup document.
pub fn render_twiml(stream_url: &str, greeting: Option<&str>) -> String {
    let mut twiml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    if let Some(greeting) = greeting {
        twiml.push_str("<Say>");
        twiml.push_str(&xml_escape(greeting));
        twiml.push_str("</Say>");
    }
    twiml.push_str(r#"<Connect><Stream url=""#);
    twiml.push_str(&xml_escape(stream_url));
    twiml.push_str(r#""/></Connect></Response>"#);
    twiml
}

/// Incoming-call webhook
///
/// Uses the configured public host, or the request's `Host` header when none is set.
/// Calls are refused while no engine API key is configured.
pub async fn voice_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    state
        .config
        .openai_api_key()
        .map_err(AppError::ServiceUnavailable)?;

    let request_host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());

    let stream_url = state.config.stream_url(request_host).ok_or_else(|| {
        AppError::BadRequest("No public host configured and no Host header".to_string())
    })?;

    info!(stream_url = %stream_url, "Answering incoming call");
    let twiml = render_twiml(&stream_url, state.config.greeting.as_deref());
    Ok(([(header::CONTENT_TYPE, "text/xml")], twiml).into_response())
}
