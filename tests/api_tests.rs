use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::sync::Arc;
use tower::util::ServiceExt;

use voxbridge::core::call::BridgeConfig;
use voxbridge::core::synthesis::{SpeechSynthesizer, SynthesisResult};
use voxbridge::{AppState, ServerConfig, routes};

struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize(&self, _text: &str) -> SynthesisResult<Vec<u8>> {
        Ok(vec![0xFF; 800])
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 5050,
        public_host: None,
        openai_api_key: Some("sk-test".to_string()),
        realtime_url: "wss://api.openai.com/v1/realtime".to_string(),
        realtime_model: "gpt-4o-realtime-preview".to_string(),
        greeting: None,
        bridge: BridgeConfig::default(),
    }
}

fn app(config: ServerConfig) -> axum::Router {
    routes::create_app(AppState::with_synthesizer(
        config,
        Arc::new(SilentSynthesizer),
    ))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = app(test_config())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "OK");
    assert_eq!(json["service"], "voxbridge");
}

#[tokio::test]
async fn test_voice_webhook_uses_request_host() {
    let request = Request::builder()
        .method("POST")
        .uri("/voice")
        .header("host", "abc123.ngrok.app")
        .body(Body::empty())
        .unwrap();
    let response = app(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/xml");
    let twiml = body_text(response).await;
    assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#));
    assert!(twiml.contains(r#"<Stream url="wss://abc123.ngrok.app/media-stream"/>"#));
    assert!(!twiml.contains("<Say>"));
}

#[tokio::test]
async fn test_voice_webhook_prefers_public_host_and_greets() {
    let mut config = test_config();
    config.public_host = Some("voice.example.com".to_string());
    config.greeting = Some("Please hold while we connect you".to_string());

    let request = Request::builder()
        .method("POST")
        .uri("/voice")
        .header("host", "internal:5050")
        .body(Body::empty())
        .unwrap();
    let response = app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let twiml = body_text(response).await;
    assert!(twiml.contains("<Say>Please hold while we connect you</Say>"));
    assert!(twiml.contains(r#"<Stream url="wss://voice.example.com/media-stream"/>"#));
}

#[tokio::test]
async fn test_voice_webhook_requires_api_key() {
    let mut config = test_config();
    config.openai_api_key = None;

    let request = Request::builder()
        .method("POST")
        .uri("/voice")
        .header("host", "voice.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_voice_webhook_without_host() {
    let request = Request::builder()
        .method("POST")
        .uri("/voice")
        .body(Body::empty())
        .unwrap();
    let response = app(test_config()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_media_stream_requires_upgrade() {
    let response = app(test_config())
        .oneshot(
            Request::builder()
                .uri("/media-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
