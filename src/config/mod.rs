//! Configuration module for the voxbridge server
//!
//! Server configuration is loaded from environment variables or from a YAML file.
//! Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voxbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use crate::core::call::BridgeConfig;
use crate::core::realtime::RealtimeConnectionConfig;
use crate::core::synthesis::SynthesisConfig;

mod env;
mod merge;
mod validation;
mod yaml;

pub use merge::parse_bool;

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Server settings (host, port, public host name)
/// - Realtime engine endpoint and API key
/// - Call-setup options
/// - Per-call tuning (`bridge`), shared read-only by every call
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Host name the telephony provider uses to reach the media stream.
    pub public_host: Option<String>,

    // Engine settings
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,

    // Call-setup settings
    /// Spoken by the telephony provider before the stream connects.
    pub greeting: Option<String>,

    pub bridge: BridgeConfig,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // The .env file is not loaded here: the YAML file is the source of truth and
        // only real environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the engine API key
    ///
    /// # Returns
    /// * `Result<&str, String>` - The API key on success, or an error message on failure
    pub fn openai_api_key(&self) -> Result<&str, String> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| "OpenAI API key not configured in server environment".to_string())
    }

    /// Connection settings for the realtime engine.
    pub fn realtime_connection(&self) -> RealtimeConnectionConfig {
        RealtimeConnectionConfig {
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            api_key: self.openai_api_key.clone().unwrap_or_default(),
        }
    }

    /// Synthesis settings with the API key filled in.
    pub fn synthesis(&self) -> SynthesisConfig {
        SynthesisConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            ..self.bridge.synthesis.clone()
        }
    }

    /// WebSocket URL the telephony provider should stream to.
    ///
    /// Falls back to the request's `Host` header when no public host is configured.
    pub fn stream_url(&self, request_host: Option<&str>) -> Option<String> {
        let host = self.public_host.as_deref().or(request_host)?;
        Some(format!("wss://{host}/media-stream"))
    }
}
