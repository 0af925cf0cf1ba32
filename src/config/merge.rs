use std::env;

use super::ServerConfig;
use super::yaml::YamlConfig;
use crate::core::call::BridgeConfig;
use crate::core::realtime::config::{DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_URL};
use crate::core::turn::ResponseMode;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: ENV > YAML > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env::var($env_var)
                .ok()
                .or($yaml_value)
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: ENV > YAML
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env::var($env_var).ok().or($yaml_value)
        };
    }

    // Server configuration
    let host = get_value!(
        "HOST",
        yaml.server.as_ref().and_then(|s| s.host.clone()),
        "0.0.0.0"
    );

    let port = if let Ok(port_str) = env::var("PORT") {
        port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT environment variable: {e}"))?
    } else {
        yaml.server.as_ref().and_then(|s| s.port).unwrap_or(5050)
    };

    let public_host = get_optional!(
        "PUBLIC_HOST",
        yaml.server.as_ref().and_then(|s| s.public_host.clone())
    );

    // Engine configuration
    let openai_api_key = get_optional!(
        "OPENAI_API_KEY",
        yaml.openai.as_ref().and_then(|o| o.api_key.clone())
    );

    let realtime_url = get_value!(
        "OPENAI_REALTIME_URL",
        yaml.openai.as_ref().and_then(|o| o.realtime_url.clone()),
        DEFAULT_REALTIME_URL
    );

    let realtime_model = get_value!(
        "OPENAI_REALTIME_MODEL",
        yaml.openai.as_ref().and_then(|o| o.realtime_model.clone()),
        DEFAULT_REALTIME_MODEL
    );

    // Call-setup configuration
    let greeting = get_optional!(
        "GREETING",
        yaml.call.as_ref().and_then(|c| c.greeting.clone())
    )
    .filter(|g| !g.trim().is_empty());

    let mut bridge = yaml.bridge.unwrap_or_default();
    apply_bridge_env(&mut bridge)?;

    Ok(ServerConfig {
        host,
        port,
        public_host,
        openai_api_key,
        realtime_url,
        realtime_model,
        greeting,
        bridge,
    })
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable: {e}")),
        Err(_) => Ok(None),
    }
}

/// Parse a boolean switch: true/false, 1/0, yes/no or on/off, any case.
pub fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if ["true", "1", "yes", "on"].iter().any(|v| s.eq_ignore_ascii_case(v)) {
        Some(true)
    } else if ["false", "0", "no", "off"].iter().any(|v| s.eq_ignore_ascii_case(v)) {
        Some(false)
    } else {
        None
    }
}

fn parse_env_bool(name: &str) -> Result<Option<bool>, String> {
    match env::var(name) {
        Ok(value) => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} environment variable: {value}")),
        Err(_) => Ok(None),
    }
}

/// Apply the per-call tuning overrides taken from the environment.
fn apply_bridge_env(bridge: &mut BridgeConfig) -> Result<(), String> {
    if let Ok(voice) = env::var("OPENAI_VOICE") {
        bridge.realtime.voice = voice.clone();
        bridge.synthesis.voice = voice;
    }
    if let Ok(instructions) = env::var("SYSTEM_PROMPT") {
        bridge.realtime.instructions = instructions;
    }
    if let Ok(url) = env::var("SYNTHESIS_URL") {
        bridge.synthesis.url = url;
    }
    if let Ok(model) = env::var("SYNTHESIS_MODEL") {
        bridge.synthesis.model = model;
    }

    if let Some(mode) = parse_env::<ResponseMode>("BRIDGE_RESPONSE_MODE")? {
        bridge.turn.response_mode = mode;
    }
    if let Some(enabled) = parse_env_bool("BRIDGE_BARGE_IN")? {
        bridge.turn.barge_in_enabled = enabled;
    }
    if let Some(enabled) = parse_env_bool("BRIDGE_TRICKLE")? {
        bridge.commit.trickle_enabled = enabled;
    }
    if let Some(threshold) = parse_env::<f32>("BRIDGE_VAD_THRESHOLD")? {
        bridge.vad.speech_threshold = threshold;
    }
    if let Some(silence_ms) = parse_env::<u64>("BRIDGE_SILENCE_MS")? {
        bridge.commit.silence_ms = silence_ms;
    }
    if let Some(max_turn_ms) = parse_env::<u64>("BRIDGE_MAX_TURN_MS")? {
        bridge.commit.max_turn_ms = max_turn_ms;
    }

    Ok(())
}
