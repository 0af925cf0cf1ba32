use std::env;
use std::path::PathBuf;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use voxbridge::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, defaulting to info when RUST_LOG is unset
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Handle CLI arguments: `voxbridge [-c|--config <file.yaml>]`
    let mut args = env::args();
    let _ = args.next();
    let mut config_path: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument '{other}'. Usage: voxbridge [--config <file>]"),
        }
    }

    // Load configuration
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path),
        None => ServerConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;

    if let Err(e) = config.openai_api_key() {
        tracing::warn!("{}; incoming calls will be refused", e);
    }

    let address = config.address();
    tracing::info!(
        response_mode = %config.bridge.turn.response_mode,
        barge_in = config.bridge.turn.barge_in_enabled,
        model = %config.realtime_model,
        "Starting server on {address}"
    );

    // Create application state
    let app_state = AppState::new(config).map_err(|e| anyhow!(e.to_string()))?;
    let app = routes::create_app(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on {address}");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
