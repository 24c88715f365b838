//! Error types shared across the Beacon crates.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("no config directory available on this platform")]
    NoConfigDir,

    #[error("failed to write config {}: {reason}", path.display())]
    WriteError { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("realtime error: {0}")]
    Realtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("presence.poll_interval_ms = 1".into());
        assert_eq!(
            err.to_string(),
            "config validation error: presence.poll_interval_ms = 1"
        );

        let err = ConfigError::WriteError {
            path: PathBuf::from("/ro/realtime.toml"),
            reason: "read-only file system".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to write config /ro/realtime.toml: read-only file system"
        );
    }

    #[test]
    fn beacon_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: BeaconError = config_err.into();
        assert!(matches!(err, BeaconError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn beacon_error_realtime_display() {
        let err = BeaconError::Realtime("not connected".into());
        assert_eq!(err.to_string(), "realtime error: not connected");
    }
}
