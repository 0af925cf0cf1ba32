//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `media_stream` - Telephony media-stream WebSocket
//! - `voice_webhook` - Call-setup document for incoming calls

pub mod api;
pub mod media_stream;
pub mod voice_webhook;

// Re-export commonly used handlers for convenient access
pub use media_stream::media_stream_handler;
pub use voice_webhook::voice_webhook_handler;
