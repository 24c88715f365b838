//! Presence room configuration types.

use serde::{Deserialize, Serialize};

/// Presence room configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Membership diff interval in milliseconds (valid range: 250-60000).
    pub poll_interval_ms: u32,
    /// Display name used when joining without explicit user info.
    pub default_name: String,
    /// Status used when joining without explicit user info.
    pub default_status: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            default_name: "Anonymous User".into(),
            default_status: "online".into(),
        }
    }
}
