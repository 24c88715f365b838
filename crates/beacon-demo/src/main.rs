//! beacon-demo: walks every realtime component through one session.
//!
//! Everything runs against `MemoryTransport`, so the demo needs no server.
//! Inbound traffic is injected through the loopback and the resulting
//! state changes are logged.

mod cli;
mod session;

use beacon_common::ConfigError;
use beacon_config::BeaconConfig;
use tracing_subscriber::EnvFilter;

fn load_config(args: &cli::Args) -> Result<BeaconConfig, ConfigError> {
    match &args.config {
        Some(path) => {
            let config = beacon_config::load_from_path(path)?;
            beacon_config::validation::validate(&config)?;
            Ok(config)
        }
        None => beacon_config::load_config(),
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    // Config is read before logging so the configured level can apply.
    let loaded = load_config(&args);
    let directive = args.log_level.clone().unwrap_or_else(|| {
        let level = loaded
            .as_ref()
            .map(|config| config.logging.level)
            .unwrap_or_default();
        level.as_directive().to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive)),
        )
        .init();

    tracing::info!("Beacon demo v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        BeaconConfig::default()
    });
    tracing::debug!("Effective config: {}", beacon_config::config_to_json(&config));

    if let Err(e) = session::run(&config, &args).await {
        tracing::error!("Session failed: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}
