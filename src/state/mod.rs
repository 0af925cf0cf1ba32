use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::call::{BridgeConfig, CallDependencies};
use crate::core::synthesis::{HttpSynthesizer, SpeechSynthesizer, SynthesisResult};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Per-call tuning, built once and shared read-only by every call
    pub bridge: Arc<BridgeConfig>,
    /// Remote synthesis for local replies
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> SynthesisResult<Arc<Self>> {
        let synthesizer = HttpSynthesizer::new(config.synthesis())?;
        Ok(Self::with_synthesizer(config, Arc::new(synthesizer)))
    }

    /// Build the state around an existing synthesizer.
    pub fn with_synthesizer(
        config: ServerConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bridge: Arc::new(config.bridge.clone()),
            config,
            synthesizer,
        })
    }

    /// Everything a new call needs.
    pub fn call_dependencies(&self) -> CallDependencies {
        CallDependencies {
            config: self.bridge.clone(),
            engine: self.config.realtime_connection(),
            synthesizer: self.synthesizer.clone(),
        }
    }
}
