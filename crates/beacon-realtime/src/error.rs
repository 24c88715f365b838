//! Error taxonomy for the realtime engine.

/// An action was attempted while the shared connection was down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("subscribe to '{channel}' rejected: {reason}")]
    SubscribeRejected { channel: String, reason: String },

    #[error("publish of '{event}' failed: {reason}")]
    PublishFailed { event: String, reason: String },

    #[error("presence join on '{channel}' rejected: {reason}")]
    JoinRejected { channel: String, reason: String },

    #[error("presence leave on '{channel}' failed: {reason}")]
    LeaveFailed { channel: String, reason: String },

    #[error("unknown subscription '{0}'")]
    UnknownSubscription(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RealtimeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("handler for '{event}' failed: {message}")]
    HandlerExecution { event: String, message: String },

    #[error("presence join failed: {0}")]
    PresenceJoin(String),

    #[error("presence leave failed: {0}")]
    PresenceLeave(String),

    #[error("channel is not subscribed")]
    NotSubscribed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<RealtimeError> for beacon_common::BeaconError {
    fn from(err: RealtimeError) -> Self {
        beacon_common::BeaconError::Realtime(err.to_string())
    }
}
