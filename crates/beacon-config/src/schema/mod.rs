//! Configuration schema types for Beacon.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod presence;
mod subscriptions;
mod tasks;

pub use logging::*;
pub use presence::*;
pub use subscriptions::*;
pub use tasks::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the realtime engine.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub subscriptions: SubscriptionsConfig,
    pub presence: PresenceConfig,
    pub tasks: TasksConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subscriptions_are_enabled() {
        let config = BeaconConfig::default();
        assert!(config.subscriptions.enabled);
        assert!(config.subscriptions.auto_subscribe);
    }

    #[test]
    fn default_presence_settings() {
        let config = BeaconConfig::default();
        assert_eq!(config.presence.poll_interval_ms, 5000);
        assert_eq!(config.presence.default_name, "Anonymous User");
        assert_eq!(config.presence.default_status, "online");
    }

    #[test]
    fn default_task_settings() {
        let config = BeaconConfig::default();
        assert_eq!(config.tasks.channel_prefix, "organization");
        assert_eq!(config.tasks.domains, vec!["import".to_string()]);
    }

    #[test]
    fn default_logging_level_is_info() {
        let config = BeaconConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.level.as_directive(), "info");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: BeaconConfig = toml::from_str(
            r#"
[presence]
poll_interval_ms = 1500
"#,
        )
        .unwrap();
        assert_eq!(config.presence.poll_interval_ms, 1500);
        assert_eq!(config.presence.default_name, "Anonymous User");
        assert!(config.subscriptions.enabled);
    }

    #[test]
    fn log_level_parses_lowercase() {
        let config: BeaconConfig = toml::from_str(
            r#"
[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
    }
}
