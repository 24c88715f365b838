//! Per-owner channel subscriptions.
//!
//! A `ChannelSubscription` is one owner's view of one channel. It keeps
//! subscribe/unsubscribe idempotent, gates publishing on the shared
//! connection state, resubscribes after a reconnect, and discards any
//! subscribe that resolves after the owner was torn down.

mod channel;


pub use channel::{Binding, ChannelSubscription, ChannelSubscriptionBuilder};

/// Owner options for a channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// When false every subscribe is a no-op.
    pub enabled: bool,
    /// Subscribe on mount and again after every reconnect.
    pub auto_subscribe: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_subscribe: true,
        }
    }
}
