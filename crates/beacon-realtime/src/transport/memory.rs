//! In-process loopback transport.
//!
//! Used by the demo binary and throughout the test suite. It records every
//! call, lets the caller inject inbound events and presence snapshots, and
//! can hold subscribe/join calls open to exercise teardown races.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_common::{new_id, ListenerId, SubscriptionId};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{ChannelHandlers, ChannelOptions, EventCallback, PresenceJoin, Transport};
use crate::error::TransportError;
use crate::presence::{MemberInfo, PresenceMember};

/// Per-method call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportCalls {
    pub subscribe: usize,
    pub unsubscribe: usize,
    pub discard: usize,
    pub bind: usize,
    pub unbind: usize,
    pub on: usize,
    pub off: usize,
    pub send: usize,
    pub join: usize,
    pub leave: usize,
    pub members: usize,
}

/// A message handed to `send_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub event: String,
    pub payload: serde_json::Value,
    pub channel: Option<String>,
}

type Listeners = Vec<(ListenerId, EventCallback)>;

struct MemorySubscription {
    channel: String,
    handlers: HashMap<String, Listeners>,
}

#[derive(Default)]
struct PresenceChannel {
    members: Vec<PresenceMember>,
    me: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    subscriptions: HashMap<SubscriptionId, MemorySubscription>,
    global: HashMap<String, Listeners>,
    presence: HashMap<String, PresenceChannel>,
    calls: TransportCalls,
    subscribe_options: Vec<ChannelOptions>,
    unsubscribed: Vec<SubscriptionId>,
    published: Vec<PublishedMessage>,
    subscribe_failure: Option<String>,
    publish_failure: Option<String>,
    join_failure: Option<String>,
    leave_failure: Option<String>,
    next_member_id: Option<String>,
}

/// Holds async calls open until released, optionally for one channel only.
#[derive(Default)]
struct Gate {
    held: Mutex<Option<(Arc<Semaphore>, Option<String>)>>,
}

impl Gate {
    fn hold(&self, only: Option<&str>) {
        *self.held.lock() = Some((Arc::new(Semaphore::new(0)), only.map(str::to_string)));
    }

    fn release(&self) {
        if let Some((semaphore, _)) = self.held.lock().take() {
            semaphore.close();
        }
    }

    async fn pass(&self, channel: &str) {
        let semaphore = match &*self.held.lock() {
            Some((semaphore, only)) if only.as_deref().map_or(true, |c| c == channel) => {
                Some(Arc::clone(semaphore))
            }
            _ => None,
        };
        if let Some(semaphore) = semaphore {
            // Closing the semaphore wakes every waiter with an error.
            let _ = semaphore.acquire().await;
        }
    }
}

/// Loopback `Transport` keeping all state in memory.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    subscribe_gate: Gate,
    join_gate: Gate,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // -- inbound -------------------------------------------------------------

    /// Deliver `event` to every subscription on `channel`. Returns the
    /// number of callbacks invoked.
    pub fn emit(&self, channel: &str, event: &str, payload: serde_json::Value) -> usize {
        let callbacks: Vec<EventCallback> = {
            let state = self.state.lock();
            state
                .subscriptions
                .values()
                .filter(|sub| sub.channel == channel)
                .filter_map(|sub| sub.handlers.get(event))
                .flat_map(|listeners| listeners.iter().map(|(_, cb)| Arc::clone(cb)))
                .collect()
        };
        debug!(channel = %channel, event = %event, listeners = callbacks.len(), "Loopback emit");
        for callback in &callbacks {
            callback(&payload);
        }
        callbacks.len()
    }

    /// Deliver `event` on the transport-wide bus.
    pub fn emit_global(&self, event: &str, payload: serde_json::Value) -> usize {
        let callbacks: Vec<EventCallback> = {
            let state = self.state.lock();
            state
                .global
                .get(event)
                .map(|listeners| listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(&payload);
        }
        callbacks.len()
    }

    /// Replace the membership snapshot of a presence channel.
    pub fn set_members(&self, channel: &str, members: Vec<PresenceMember>) {
        self.state
            .lock()
            .presence
            .entry(channel.to_string())
            .or_default()
            .members = members;
    }

    // -- failure injection ---------------------------------------------------

    pub fn fail_subscribes(&self, reason: Option<&str>) {
        self.state.lock().subscribe_failure = reason.map(str::to_string);
    }

    pub fn fail_publishes(&self, reason: Option<&str>) {
        self.state.lock().publish_failure = reason.map(str::to_string);
    }

    pub fn fail_joins(&self, reason: Option<&str>) {
        self.state.lock().join_failure = reason.map(str::to_string);
    }

    pub fn fail_leaves(&self, reason: Option<&str>) {
        self.state.lock().leave_failure = reason.map(str::to_string);
    }

    /// Id handed out by the next presence join.
    pub fn assign_member_id(&self, id: &str) {
        self.state.lock().next_member_id = Some(id.to_string());
    }

    /// Keep subscribe calls pending until `release_subscribes`.
    pub fn hold_subscribes(&self) {
        self.subscribe_gate.hold(None);
    }

    /// Like `hold_subscribes`, but only for `channel`.
    pub fn hold_subscribes_to(&self, channel: &str) {
        self.subscribe_gate.hold(Some(channel));
    }

    pub fn release_subscribes(&self) {
        self.subscribe_gate.release();
    }

    /// Keep presence joins pending until `release_joins`.
    pub fn hold_joins(&self) {
        self.join_gate.hold(None);
    }

    pub fn release_joins(&self) {
        self.join_gate.release();
    }

    // -- inspection ----------------------------------------------------------

    pub fn calls(&self) -> TransportCalls {
        self.state.lock().calls.clone()
    }

    pub fn subscribe_options(&self) -> Vec<ChannelOptions> {
        self.state.lock().subscribe_options.clone()
    }

    /// Ids of subscriptions that are still active.
    pub fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        self.state.lock().subscriptions.keys().cloned().collect()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    /// Number of callbacks bound to `event` across subscriptions on `channel`.
    pub fn listener_count(&self, channel: &str, event: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|sub| sub.channel == channel)
            .filter_map(|sub| sub.handlers.get(event))
            .map(Vec::len)
            .sum()
    }

    pub fn global_listener_count(&self, event: &str) -> usize {
        self.state.lock().global.get(event).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe_to_channel(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
        options: &ChannelOptions,
    ) -> Result<SubscriptionId, TransportError> {
        {
            let mut state = self.state.lock();
            state.calls.subscribe += 1;
            state.subscribe_options.push(options.clone());
        }

        self.subscribe_gate.pass(channel).await;

        let mut state = self.state.lock();
        if let Some(reason) = state.subscribe_failure.clone() {
            return Err(TransportError::SubscribeRejected {
                channel: channel.to_string(),
                reason,
            });
        }

        let id = SubscriptionId::new();
        let handlers = handlers
            .into_iter()
            .map(|(event, cb)| (event, vec![(ListenerId::next(), cb)]))
            .collect();
        state.subscriptions.insert(
            id.clone(),
            MemorySubscription {
                channel: channel.to_string(),
                handlers,
            },
        );
        debug!(channel = %channel, subscription = %id, "Loopback subscribe");
        Ok(id)
    }

    fn unsubscribe_from_channel(&self, id: &SubscriptionId) {
        let mut state = self.state.lock();
        state.calls.unsubscribe += 1;
        state.subscriptions.remove(id);
        state.unsubscribed.push(id.clone());
    }

    fn discard_subscription(&self, id: &SubscriptionId) {
        let mut state = self.state.lock();
        state.calls.discard += 1;
        state.subscriptions.remove(id);
    }

    fn bind(
        &self,
        id: &SubscriptionId,
        event: &str,
        callback: EventCallback,
    ) -> Result<ListenerId, TransportError> {
        let mut state = self.state.lock();
        state.calls.bind += 1;
        let sub = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| TransportError::UnknownSubscription(id.to_string()))?;
        let listener = ListenerId::next();
        sub.handlers
            .entry(event.to_string())
            .or_default()
            .push((listener, callback));
        Ok(listener)
    }

    fn unbind(&self, id: &SubscriptionId, event: &str, listener: ListenerId) {
        let mut state = self.state.lock();
        state.calls.unbind += 1;
        if let Some(listeners) = state
            .subscriptions
            .get_mut(id)
            .and_then(|sub| sub.handlers.get_mut(event))
        {
            listeners.retain(|(l, _)| *l != listener);
        }
    }

    fn on(&self, event: &str, callback: EventCallback) -> ListenerId {
        let mut state = self.state.lock();
        state.calls.on += 1;
        let listener = ListenerId::next();
        state
            .global
            .entry(event.to_string())
            .or_default()
            .push((listener, callback));
        listener
    }

    fn off(&self, event: &str, listener: ListenerId) {
        let mut state = self.state.lock();
        state.calls.off += 1;
        if let Some(listeners) = state.global.get_mut(event) {
            listeners.retain(|(l, _)| *l != listener);
        }
    }

    async fn send_message(
        &self,
        event: &str,
        payload: serde_json::Value,
        channel: Option<&str>,
    ) -> Result<serde_json::Value, TransportError> {
        let mut state = self.state.lock();
        state.calls.send += 1;
        if let Some(reason) = state.publish_failure.clone() {
            return Err(TransportError::PublishFailed {
                event: event.to_string(),
                reason,
            });
        }
        state.published.push(PublishedMessage {
            event: event.to_string(),
            payload,
            channel: channel.map(str::to_string),
        });
        Ok(serde_json::json!({ "event": event, "channel": channel, "delivered": true }))
    }

    async fn join_presence_channel(
        &self,
        channel: &str,
        user_info: &MemberInfo,
    ) -> Result<PresenceJoin, TransportError> {
        self.state.lock().calls.join += 1;

        self.join_gate.pass(channel).await;

        let mut state = self.state.lock();
        if let Some(reason) = state.join_failure.clone() {
            return Err(TransportError::JoinRejected {
                channel: channel.to_string(),
                reason,
            });
        }

        let id = state.next_member_id.take().unwrap_or_else(new_id);
        let room = state.presence.entry(channel.to_string()).or_default();
        if !room.members.iter().any(|m| m.id == id) {
            room.members.push(PresenceMember::new(id.clone(), user_info.clone()));
        }
        room.me = Some(id.clone());
        Ok(PresenceJoin::new(id))
    }

    fn leave_presence_channel(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.leave += 1;
        if let Some(reason) = state.leave_failure.clone() {
            return Err(TransportError::LeaveFailed {
                channel: channel.to_string(),
                reason,
            });
        }
        if let Some(room) = state.presence.get_mut(channel) {
            if let Some(me) = room.me.take() {
                room.members.retain(|m| m.id != me);
            }
        }
        Ok(())
    }

    fn presence_members(&self, channel: &str) -> Vec<PresenceMember> {
        let mut state = self.state.lock();
        state.calls.members += 1;
        state
            .presence
            .get(channel)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    fn is_in_presence_channel(&self, channel: &str) -> bool {
        self.state
            .lock()
            .presence
            .get(channel)
            .is_some_and(|room| room.me.is_some())
    }
}
