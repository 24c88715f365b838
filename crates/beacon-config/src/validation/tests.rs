//! Tests for the full validation pipeline.

use super::*;
use crate::schema::BeaconConfig;

#[test]
fn default_config_validates() {
    let config = BeaconConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_poll_interval_too_small() {
    let mut config = BeaconConfig::default();
    config.presence.poll_interval_ms = 100;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.poll_interval_ms"));
}

#[test]
fn catches_poll_interval_too_large() {
    let mut config = BeaconConfig::default();
    config.presence.poll_interval_ms = 120_000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.poll_interval_ms"));
}

#[test]
fn catches_empty_default_name() {
    let mut config = BeaconConfig::default();
    config.presence.default_name = "   ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.default_name"));
}

#[test]
fn catches_missing_domains() {
    let mut config = BeaconConfig::default();
    config.tasks.domains.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("tasks.domains"));
}

#[test]
fn catches_duplicate_domains() {
    let mut config = BeaconConfig::default();
    config.tasks.domains = vec!["import".into(), "export".into(), "import".into()];
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("duplicate 'import'"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = BeaconConfig::default();
    config.presence.poll_interval_ms = 1;
    config.tasks.channel_prefix.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.poll_interval_ms"));
    assert!(err.contains("tasks.channel_prefix"));
    assert!(err.contains("; "));
}
