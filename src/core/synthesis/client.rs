use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::{SpeechSynthesizer, SynthesisConfig, SynthesisError, SynthesisResult};
use crate::core::codec;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    /// Raw 24 kHz 16-bit little-endian PCM.
    response_format: &'static str,
}

/// Client for an OpenAI-compatible `/v1/audio/speech` endpoint.
pub struct HttpSynthesizer {
    client: Client,
    config: SynthesisConfig,
}

impl HttpSynthesizer {
    pub fn new(config: SynthesisConfig) -> SynthesisResult<Self> {
        if config.url.is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "Synthesis URL is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| {
                SynthesisError::InvalidConfiguration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> SynthesisResult<Vec<u8>> {
        let body = SpeechRequest {
            model: &self.config.model,
            voice: &self.config.voice,
            input: text,
            response_format: "pcm",
        };

        let mut request = self.client.post(&self.config.url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            const MAX_ERROR_BODY_LEN: usize = 500;
            let mut body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            if body.len() > MAX_ERROR_BODY_LEN {
                let cut = (0..=MAX_ERROR_BODY_LEN)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
                body.push_str("... (truncated)");
            }
            return Err(SynthesisError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        let pcm = response.bytes().await?;
        let audio = codec::pcm24k_to_mulaw(&pcm);
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        debug!(
            pcm_bytes = pcm.len(),
            mulaw_bytes = audio.len(),
            "Synthesized local reply"
        );
        Ok(audio)
    }
}
