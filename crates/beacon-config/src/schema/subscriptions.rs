//! Channel subscription defaults.

use serde::{Deserialize, Serialize};

/// Default options applied to every channel subscription owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    /// Master switch; when false owners never reach the transport.
    pub enabled: bool,
    /// Subscribe on mount and resubscribe after a reconnect.
    pub auto_subscribe: bool,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_subscribe: true,
        }
    }
}
