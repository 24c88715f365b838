//! Realtime channel, event and presence subscriptions for Beacon.
//!
//! One shared transport connection is turned into many independently owned
//! subscriptions:
//! - `ConnectionSupervisor` holds the shared connection state
//! - `ChannelSubscription` subscribes one owner to one channel
//! - `EventListener` listens globally or on a channel
//! - `PresenceRoom` tracks membership of a presence channel
//! - `TaskTracker` / `MultiTaskTracker` mirror background task progress
//!
//! Owners tear themselves down on drop.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod presence;
mod revision;
pub mod subscription;
pub mod tasks;
pub mod transport;

pub use connection::{ConnectionHandle, ConnectionState, ConnectionSupervisor};
pub use dispatcher::{EventListener, ListenerOptions};
pub use error::{ConnectionError, RealtimeError, TransportError};
pub use handler::{handler, Handler, HandlerError, HandlerResult, HandlerSlot, LifecycleCallbacks};
pub use presence::{
    diff_members, MemberDiff, MemberInfo, MemberStatus, PresenceCallbacks, PresenceMember,
    PresenceOptions, PresenceRoom,
};
pub use subscription::{Binding, ChannelSubscription, SubscriptionOptions};
pub use tasks::{
    organization_channel, MultiTaskTracker, TaskDomain, TaskEventKind, TaskProgressRecord,
    TaskStatus, TaskTracker,
};
pub use transport::{MemoryTransport, SubscriptionRegistry, Transport};
