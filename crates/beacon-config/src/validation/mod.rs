//! Full configuration validation.
//!
//! Validates numeric ranges and required strings, collecting every
//! problem into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::BeaconConfig;
use beacon_common::ConfigError;

use helpers::{validate_non_empty, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &BeaconConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_presence(&mut errors, config);
    validate_tasks(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_presence(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_range(
        errors,
        "presence.poll_interval_ms",
        config.presence.poll_interval_ms,
        250,
        60_000,
    );
    validate_non_empty(errors, "presence.default_name", &config.presence.default_name);
    validate_non_empty(
        errors,
        "presence.default_status",
        &config.presence.default_status,
    );
}

fn validate_tasks(errors: &mut Vec<String>, config: &BeaconConfig) {
    validate_non_empty(errors, "tasks.channel_prefix", &config.tasks.channel_prefix);
    if config.tasks.domains.is_empty() {
        errors.push("tasks.domains must list at least one domain".into());
    }
    for (i, domain) in config.tasks.domains.iter().enumerate() {
        validate_non_empty(errors, &format!("tasks.domains[{i}]"), domain);
        if config.tasks.domains[..i].contains(domain) {
            errors.push(format!("tasks.domains contains duplicate '{domain}'"));
        }
    }
}
