//! Ref-counted channel sharing across independent owners.
//!
//! `SubscriptionRegistry` wraps another transport and implements
//! `Transport` itself. The first owner of a channel creates the upstream
//! subscription; later owners only bind their handlers onto it. Every owner
//! gets its own subscription id, and the upstream unsubscribe happens when
//! the last owner releases the channel. When the connection drops, owners
//! discard their ids and the shared record goes with the last of them, so a
//! reconnect starts from a fresh upstream subscription.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_common::{ListenerId, SubscriptionId};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{ChannelHandlers, ChannelOptions, EventCallback, PresenceJoin, Transport};
use crate::error::TransportError;
use crate::presence::{MemberInfo, PresenceMember};

/// Serializes subscribes on one channel name.
type ChannelGate = Arc<tokio::sync::Mutex<()>>;

struct SharedChannel {
    upstream: SubscriptionId,
    owners: usize,
}

struct OwnerEntry {
    channel: String,
    listeners: Vec<(String, ListenerId)>,
}

#[derive(Default)]
struct RegistryState {
    channels: HashMap<String, SharedChannel>,
    owners: HashMap<SubscriptionId, OwnerEntry>,
    gates: HashMap<String, ChannelGate>,
}

impl RegistryState {
    /// Detach `id` from its channel. Returns the entry, the upstream id and
    /// whether it was the last owner; the last owner also drops the record.
    fn detach(&mut self, id: &SubscriptionId) -> Option<(OwnerEntry, SubscriptionId, bool)> {
        let entry = self.owners.remove(id)?;
        let shared = self.channels.get_mut(&entry.channel)?;
        shared.owners = shared.owners.saturating_sub(1);
        let upstream = shared.upstream.clone();
        let last = shared.owners == 0;
        if last {
            self.channels.remove(&entry.channel);
            self.prune_gate(&entry.channel);
        }
        Some((entry, upstream, last))
    }

    /// Drop the gate of a channel nobody shares or waits on.
    fn prune_gate(&mut self, channel: &str) {
        let idle = !self.channels.contains_key(channel)
            && self
                .gates
                .get(channel)
                .is_some_and(|gate| Arc::strong_count(gate) == 1);
        if idle {
            self.gates.remove(channel);
        }
    }
}

pub struct SubscriptionRegistry {
    upstream: Arc<dyn Transport>,
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new(upstream: Arc<dyn Transport>) -> Self {
        Self {
            upstream,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Number of owners currently sharing `channel`.
    pub fn owner_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |shared| shared.owners)
    }

    fn gate(&self, channel: &str) -> ChannelGate {
        let mut state = self.state.lock();
        let gate = state
            .gates
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
        Arc::clone(gate)
    }

    fn upstream_for(&self, owner: &SubscriptionId) -> Option<SubscriptionId> {
        let state = self.state.lock();
        let entry = state.owners.get(owner)?;
        state
            .channels
            .get(&entry.channel)
            .map(|shared| shared.upstream.clone())
    }

    fn release_if_unused(&self, channel: &str) {
        let released = {
            let mut state = self.state.lock();
            match state.channels.get(channel) {
                Some(shared) if shared.owners == 0 => state.channels.remove(channel),
                _ => None,
            }
        };
        if let Some(shared) = released {
            self.upstream.unsubscribe_from_channel(&shared.upstream);
            info!(channel = %channel, "Released shared channel");
        }
    }

    /// Attach a new owner to `channel`, creating the upstream subscription
    /// if needed. Callers hold the channel's gate.
    async fn attach(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
        options: &ChannelOptions,
    ) -> Result<SubscriptionId, TransportError> {
        let existing = self
            .state
            .lock()
            .channels
            .get(channel)
            .map(|shared| shared.upstream.clone());

        let upstream = match existing {
            Some(upstream) => upstream,
            None => {
                let upstream = self
                    .upstream
                    .subscribe_to_channel(channel, ChannelHandlers::new(), options)
                    .await?;
                self.state.lock().channels.insert(
                    channel.to_string(),
                    SharedChannel {
                        upstream: upstream.clone(),
                        owners: 0,
                    },
                );
                upstream
            }
        };

        let mut listeners = Vec::with_capacity(handlers.len());
        for (event, callback) in handlers {
            match self.upstream.bind(&upstream, &event, callback) {
                Ok(listener) => listeners.push((event, listener)),
                Err(e) => {
                    for (event, listener) in listeners {
                        self.upstream.unbind(&upstream, &event, listener);
                    }
                    self.release_if_unused(channel);
                    return Err(e);
                }
            }
        }

        let owner = SubscriptionId::new();
        let owners = {
            let mut state = self.state.lock();
            let owners = match state.channels.get_mut(channel) {
                Some(shared) => {
                    shared.owners += 1;
                    shared.owners
                }
                None => 0,
            };
            state.owners.insert(
                owner.clone(),
                OwnerEntry {
                    channel: channel.to_string(),
                    listeners,
                },
            );
            owners
        };
        debug!(channel = %channel, owner = %owner, owners, "Owner attached to channel");
        Ok(owner)
    }
}

#[async_trait]
impl Transport for SubscriptionRegistry {
    async fn subscribe_to_channel(
        &self,
        channel: &str,
        handlers: ChannelHandlers,
        options: &ChannelOptions,
    ) -> Result<SubscriptionId, TransportError> {
        // Two owners racing on a fresh channel must produce one upstream
        // subscription; other channels are not held up.
        let gate = self.gate(channel);
        let result = {
            let _serial = gate.lock().await;
            self.attach(channel, handlers, options).await
        };
        drop(gate);
        self.state.lock().prune_gate(channel);
        result
    }

    fn unsubscribe_from_channel(&self, id: &SubscriptionId) {
        let Some((entry, upstream, last)) = self.state.lock().detach(id) else {
            return;
        };
        for (event, listener) in &entry.listeners {
            self.upstream.unbind(&upstream, event, *listener);
        }
        debug!(channel = %entry.channel, owner = %id, "Owner detached from channel");
        if last {
            self.upstream.unsubscribe_from_channel(&upstream);
            info!(channel = %entry.channel, "Released shared channel");
        }
    }

    fn discard_subscription(&self, id: &SubscriptionId) {
        let Some((entry, upstream, last)) = self.state.lock().detach(id) else {
            return;
        };
        if last {
            self.upstream.discard_subscription(&upstream);
            info!(channel = %entry.channel, "Shared channel lost with connection");
        } else {
            for (event, listener) in &entry.listeners {
                self.upstream.unbind(&upstream, event, *listener);
            }
            debug!(channel = %entry.channel, owner = %id, "Owner discarded from channel");
        }
    }

    fn bind(
        &self,
        id: &SubscriptionId,
        event: &str,
        callback: EventCallback,
    ) -> Result<ListenerId, TransportError> {
        let upstream = self
            .upstream_for(id)
            .ok_or_else(|| TransportError::UnknownSubscription(id.to_string()))?;
        let listener = self.upstream.bind(&upstream, event, callback)?;
        if let Some(entry) = self.state.lock().owners.get_mut(id) {
            entry.listeners.push((event.to_string(), listener));
        }
        Ok(listener)
    }

    fn unbind(&self, id: &SubscriptionId, event: &str, listener: ListenerId) {
        let Some(upstream) = self.upstream_for(id) else {
            return;
        };
        if let Some(entry) = self.state.lock().owners.get_mut(id) {
            entry
                .listeners
                .retain(|(e, l)| !(e == event && *l == listener));
        }
        self.upstream.unbind(&upstream, event, listener);
    }

    fn on(&self, event: &str, callback: EventCallback) -> ListenerId {
        self.upstream.on(event, callback)
    }

    fn off(&self, event: &str, listener: ListenerId) {
        self.upstream.off(event, listener)
    }

    async fn send_message(
        &self,
        event: &str,
        payload: serde_json::Value,
        channel: Option<&str>,
    ) -> Result<serde_json::Value, TransportError> {
        self.upstream.send_message(event, payload, channel).await
    }

    async fn join_presence_channel(
        &self,
        channel: &str,
        user_info: &MemberInfo,
    ) -> Result<PresenceJoin, TransportError> {
        self.upstream.join_presence_channel(channel, user_info).await
    }

    fn leave_presence_channel(&self, channel: &str) -> Result<(), TransportError> {
        self.upstream.leave_presence_channel(channel)
    }

    fn presence_members(&self, channel: &str) -> Vec<PresenceMember> {
        self.upstream.presence_members(channel)
    }

    fn is_in_presence_channel(&self, channel: &str) -> bool {
        self.upstream.is_in_presence_channel(channel)
    }
}
