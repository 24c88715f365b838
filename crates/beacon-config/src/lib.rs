//! Beacon configuration system.
//!
//! Provides TOML-based configuration for the realtime engine with full
//! validation. All config sections use sensible defaults so partial
//! configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use beacon_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{BeaconConfig, CONFIG_SCHEMA_VERSION};
pub use toml_loader::{load_default, load_from_path, load_from_str};

use beacon_common::ConfigError;

/// Convenience function to load config from the platform default path.
///
/// Loads `realtime.toml` from the OS config directory, creates a default
/// if none exists, and validates the result.
pub fn load_config() -> Result<BeaconConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &BeaconConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
