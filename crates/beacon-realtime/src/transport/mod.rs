//! The realtime transport boundary.
//!
//! Everything below this trait is an opaque pub/sub service. Event names
//! are plain strings here; typed event sets live in the modules that
//! consume them.

mod memory;
mod registry;

pub use memory::{MemoryTransport, PublishedMessage, TransportCalls};
pub use registry::SubscriptionRegistry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_common::{ListenerId, SubscriptionId};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::presence::{MemberInfo, PresenceMember};

/// Callback stored with the transport and invoked for every delivered event.
pub type EventCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// String-keyed handler table handed over on subscribe.
pub type ChannelHandlers = HashMap<String, EventCallback>;

/// Options forwarded with a channel subscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    pub auto_subscribe: bool,
}

/// Identity assigned by the transport when joining a presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMe {
    pub id: String,
}

/// Resolution of a presence join: `{ me: { id } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceJoin {
    pub me: PresenceMe,
}

impl PresenceJoin {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            me: PresenceMe { id: id.into() },
        }
    }
}

/// A multiplexed publish/subscribe connection.
///
/// Implementations invoke callbacks in the order messages arrive on a
/// channel; no ordering is expected across channels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to `channel`, registering `handlers` for its events.
    async fn subscribe_to_channel(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
        options: &ChannelOptions,
    ) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe_from_channel(&self, id: &SubscriptionId);

    /// Forget a subscription that went down with the connection. Nothing
    /// is sent upstream.
    fn discard_subscription(&self, id: &SubscriptionId);

    /// Add one handler to an existing subscription.
    fn bind(
        &self,
        id: &SubscriptionId,
        event: &str,
        callback: EventCallback,
    ) -> Result<ListenerId, TransportError>;

    fn unbind(&self, id: &SubscriptionId, event: &str, listener: ListenerId);

    /// Listen on the transport-wide event bus.
    fn on(&self, event: &str, callback: EventCallback) -> ListenerId;

    fn off(&self, event: &str, listener: ListenerId);

    async fn send_message(
        &self,
        event: &str,
        payload: serde_json::Value,
        channel: Option<&str>,
    ) -> Result<serde_json::Value, TransportError>;

    async fn join_presence_channel(
        &self,
        channel: &str,
        user_info: &MemberInfo,
    ) -> Result<PresenceJoin, TransportError>;

    fn leave_presence_channel(&self, channel: &str) -> Result<(), TransportError>;

    fn presence_members(&self, channel: &str) -> Vec<PresenceMember>;

    fn is_in_presence_channel(&self, channel: &str) -> bool;
}
