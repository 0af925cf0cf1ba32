//! # Media Stream Handler Module
//!
//! WebSocket endpoint for the telephony provider's bidirectional media stream.
//! One socket carries one call.
//!
//! ### Connection Flow
//! 1. The provider fetches the call-setup document from `POST /voice`
//! 2. It connects to `/media-stream` and sends `connected`, then `start`
//! 3. The server opens an engine session and starts the call runner
//! 4. `media` frames carry caller audio; the server answers with `media`, `mark`
//!    and `clear` frames
//! 5. `stop` or socket close tears the call down
//!
//! ### Message Types
//!
//! **Incoming Messages:**
//! - `{"event": "connected", "protocol": "Call", "version": "1.0.0"}`
//! - `{"event": "start", "start": {"streamSid": "MZ...", "callSid": "CA...", ...}}`
//! - `{"event": "media", "media": {"payload": "<base64 µ-law>"}}`
//! - `{"event": "mark", "mark": {"name": "resp_1"}}` - playback reached a mark
//! - `{"event": "stop"}`
//!
//! **Outgoing Messages:**
//! - `{"event": "media", "streamSid": "MZ...", "media": {"payload": "<base64 µ-law>"}}` - one 20 ms frame
//! - `{"event": "mark", "streamSid": "MZ...", "mark": {"name": "resp_1"}}` - end of an utterance
//! - `{"event": "clear", "streamSid": "MZ..."}` - drop buffered playback

pub mod error;
pub mod handler;
pub mod messages;

pub use error::{MediaStreamError, MediaStreamResult};
pub use handler::media_stream_handler;
pub use messages::{InboundMessage, OutboundMessage};
