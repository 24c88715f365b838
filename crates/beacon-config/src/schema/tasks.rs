//! Background task tracking configuration types.

use serde::{Deserialize, Serialize};

/// Task progress bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Prefix of the per-organization task channel (`<prefix>.<org_id>`).
    pub channel_prefix: String,
    /// Task domains whose lifecycle events are routed to trackers.
    pub domains: Vec<String>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "organization".into(),
            domains: vec!["import".into()],
        }
    }
}
