use serde::Deserialize;
use std::path::PathBuf;

use crate::core::call::BridgeConfig;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment variables can
/// override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5050
///   public_host: "voice.example.com"
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   realtime_model: "gpt-4o-realtime-preview"
///
/// call:
///   greeting: "Please wait while we connect you."
///
/// bridge:
///   vad:
///     speech_threshold: 20.0
///   commit:
///     silence_ms: 700
///     max_turn_ms: 15000
///     trickle_enabled: true
///   turn:
///     response_mode: engine
///     barge_in_enabled: false
///   pacer:
///     prebuffer_frames: 4
///   realtime:
///     voice: "alloy"
///     instructions: "You are a friendly phone assistant."
///   synthesis:
///     url: "https://api.openai.com/v1/audio/speech"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub call: Option<CallYaml>,
    pub bridge: Option<BridgeConfig>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
}

/// Realtime engine configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_model: Option<String>,
}

/// Call-setup configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallYaml {
    pub greeting: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
