//! Media-stream message types
//!
//! Inbound and outbound JSON frames of the telephony media stream. Every frame
//! carries an `event` discriminator.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{MediaStreamError, MediaStreamResult};
use crate::core::call::{TransportCommand, TransportEvent};

/// Messages received from the telephony provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        start: StartInfo,
    },
    Media {
        media: InboundMedia,
    },
    Mark {
        mark: MarkInfo,
    },
    Stop {
        #[serde(default)]
        stop: Option<StopInfo>,
    },
    /// Any event this bridge does not act on (e.g. `dtmf`).
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMedia {
    /// Base64 µ-law audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInfo {
    #[serde(default)]
    pub call_sid: Option<String>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> MediaStreamResult<Self> {
        serde_json::from_str(text).map_err(|e| MediaStreamError::InvalidMessage(e.to_string()))
    }

    /// Convert into a call event. `start`, `connected` and unknown events have
    /// no call-level counterpart.
    pub fn into_transport_event(self) -> MediaStreamResult<Option<TransportEvent>> {
        match self {
            Self::Media { media } => {
                if media.track.as_deref().is_some_and(|t| t != "inbound") {
                    return Ok(None);
                }
                let audio = BASE64_STANDARD
                    .decode(media.payload.as_bytes())
                    .map_err(|e| MediaStreamError::InvalidPayload(e.to_string()))?;
                Ok(Some(TransportEvent::Media(Bytes::from(audio))))
            }
            Self::Mark { mark } => Ok(Some(TransportEvent::Mark(mark.name))),
            Self::Stop { .. } => Ok(Some(TransportEvent::Stop)),
            Self::Connected { .. } | Self::Start { .. } | Self::Other => Ok(None),
        }
    }
}

/// Messages sent to the telephony provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkInfo,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl OutboundMessage {
    pub fn from_command(stream_sid: &str, command: TransportCommand) -> Self {
        let stream_sid = stream_sid.to_string();
        match command {
            TransportCommand::Media(frame) => Self::Media {
                stream_sid,
                media: OutboundMedia {
                    payload: BASE64_STANDARD.encode(&frame),
                },
            },
            TransportCommand::Mark(name) => Self::Mark {
                stream_sid,
                mark: MarkInfo { name },
            },
            TransportCommand::Clear => Self::Clear { stream_sid },
        }
    }
}
