//! Channel subscription that tracks connection state and rebinds handlers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use beacon_common::{new_correlation_id, ListenerId, SubscriptionId};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::SubscriptionOptions;
use crate::connection::ConnectionHandle;
use crate::error::{ConnectionError, RealtimeError};
use crate::handler::{dispatch_wrapper, Handler, HandlerSlot, LifecycleCallbacks};
use crate::revision::Revision;
use crate::transport::{ChannelHandlers, ChannelOptions, Transport};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

enum Phase {
    Idle,
    /// A subscribe call is in flight; the value is its generation.
    Pending(u64),
    Active(SubscriptionId),
}

struct DynamicBinding {
    subscription: SubscriptionId,
    event: String,
    listener: ListenerId,
}

struct State {
    phase: Phase,
    /// Cleared by teardown. A subscribe resolving afterwards is released.
    alive: bool,
    generation: u64,
    bindings: HashMap<u64, DynamicBinding>,
    next_binding: u64,
}

impl State {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            alive: true,
            generation: 0,
            bindings: HashMap::new(),
            next_binding: 0,
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    connection: ConnectionHandle,
    channel: String,
    /// Correlation id tagging this owner's log lines.
    owner: String,
    options: SubscriptionOptions,
    callbacks: LifecycleCallbacks,
    slots: HashMap<String, HandlerSlot>,
    state: Mutex<State>,
    revision: Revision,
}

impl Inner {
    fn channel_handlers(&self) -> ChannelHandlers {
        self.slots
            .iter()
            .map(|(event, slot)| {
                (
                    event.clone(),
                    dispatch_wrapper(event, slot.clone(), self.callbacks.on_error.clone()),
                )
            })
            .collect()
    }

    async fn subscribe(&self) -> Result<(), RealtimeError> {
        if !self.options.enabled || !self.options.auto_subscribe {
            debug!(channel = %self.channel, owner = %self.owner, "Subscribe disabled by options");
            return Ok(());
        }
        if !self.connection.is_connected() {
            debug!(channel = %self.channel, owner = %self.owner, "Subscribe skipped while disconnected");
            return Ok(());
        }

        let generation = {
            let mut state = self.state.lock();
            if !state.alive || !matches!(state.phase, Phase::Idle) {
                return Ok(());
            }
            state.generation += 1;
            state.phase = Phase::Pending(state.generation);
            state.generation
        };
        self.revision.bump();

        let options = ChannelOptions {
            auto_subscribe: self.options.auto_subscribe,
        };
        let result = self
            .transport
            .subscribe_to_channel(&self.channel, self.channel_handlers(), &options)
            .await;

        match result {
            Ok(id) => {
                let accepted = {
                    let mut state = self.state.lock();
                    let current = state.alive
                        && matches!(state.phase, Phase::Pending(g) if g == generation);
                    if current {
                        state.phase = Phase::Active(id.clone());
                    }
                    current
                };
                if !accepted {
                    info!(
                        channel = %self.channel,
                        owner = %self.owner,
                        subscription = %id,
                        "Releasing stale subscription"
                    );
                    self.transport.unsubscribe_from_channel(&id);
                    return Ok(());
                }

                info!(channel = %self.channel, owner = %self.owner, subscription = %id, "Channel subscribed");
                self.revision.bump();
                self.callbacks.connected();
                Ok(())
            }
            Err(e) => {
                let current = {
                    let mut state = self.state.lock();
                    let current = matches!(state.phase, Phase::Pending(g) if g == generation);
                    if current {
                        state.phase = Phase::Idle;
                    }
                    current && state.alive
                };
                let err = RealtimeError::Subscription(e.to_string());
                if current {
                    warn!(channel = %self.channel, owner = %self.owner, error = %e, "Channel subscribe failed");
                    self.revision.bump();
                    self.callbacks.error(&err);
                }
                Err(err)
            }
        }
    }

    fn unsubscribe(&self) {
        let id = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Active(id) => {
                    state.bindings.clear();
                    id
                }
                Phase::Pending(_) => {
                    drop(state);
                    debug!(channel = %self.channel, owner = %self.owner, "Pending subscribe cancelled");
                    self.revision.bump();
                    return;
                }
                Phase::Idle => return,
            }
        };

        self.transport.unsubscribe_from_channel(&id);
        info!(channel = %self.channel, owner = %self.owner, subscription = %id, "Channel unsubscribed");
        self.revision.bump();
        self.callbacks.disconnected();
    }

    /// The shared connection dropped. The subscription is gone upstream,
    /// so the transport only forgets it.
    fn connection_lost(&self) {
        let lost = {
            let mut state = self.state.lock();
            state.bindings.clear();
            match std::mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Active(id) => Some(id),
                _ => None,
            }
        };
        if let Some(id) = lost {
            self.transport.discard_subscription(&id);
            info!(channel = %self.channel, owner = %self.owner, subscription = %id, "Subscription lost with connection");
            self.revision.bump();
            self.callbacks.disconnected();
        }
    }

    fn unbind(&self, key: u64) {
        let removed = {
            let mut state = self.state.lock();
            let Some(binding) = state.bindings.remove(&key) else {
                return;
            };
            match &state.phase {
                Phase::Active(id) if *id == binding.subscription => Some(binding),
                _ => None,
            }
        };
        if let Some(binding) = removed {
            self.transport
                .unbind(&binding.subscription, &binding.event, binding.listener);
            debug!(channel = %self.channel, event = %binding.event, "Handler unbound");
        }
    }

    fn teardown(&self) {
        let released = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            state.bindings.clear();
            match std::mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Active(id) => Some(id),
                _ => None,
            }
        };
        if let Some(id) = &released {
            self.transport.unsubscribe_from_channel(id);
        }
        info!(
            channel = %self.channel,
            owner = %self.owner,
            released = released.is_some(),
            "Channel owner torn down"
        );
        self.revision.bump();
    }
}

fn spawn_subscribe(runtime: &Handle, inner: &Arc<Inner>) {
    let inner = Arc::clone(inner);
    // Not aborted by teardown; a late id must still come back to be released.
    runtime.spawn(async move {
        let _ = inner.subscribe().await;
    });
}

fn spawn_watcher(runtime: &Handle, inner: &Arc<Inner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let mut rx = inner.connection.watch();
    let handle = runtime.clone();
    runtime.spawn(async move {
        let mut was_connected = rx.borrow_and_update().is_connected();
        while rx.changed().await.is_ok() {
            let connected = rx.borrow_and_update().is_connected();
            if connected == was_connected {
                continue;
            }
            was_connected = connected;

            let Some(inner) = weak.upgrade() else {
                break;
            };
            if connected {
                if inner.options.auto_subscribe {
                    debug!(channel = %inner.channel, owner = %inner.owner, "Resubscribing after reconnect");
                    spawn_subscribe(&handle, &inner);
                }
            } else {
                inner.connection_lost();
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects the handler table and options for one channel owner.
pub struct ChannelSubscriptionBuilder {
    transport: Arc<dyn Transport>,
    connection: ConnectionHandle,
    channel: String,
    handlers: HashMap<String, Handler>,
    options: SubscriptionOptions,
    callbacks: LifecycleCallbacks,
}

impl ChannelSubscriptionBuilder {
    pub fn handler(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(event.into(), handler);
        self
    }

    /// Merge several handlers. Later entries replace earlier ones for the
    /// same event.
    pub fn handlers<I, S>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        self.handlers
            .extend(handlers.into_iter().map(|(event, h)| (event.into(), h)));
        self
    }

    pub fn options(mut self, options: SubscriptionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn callbacks(mut self, callbacks: LifecycleCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Create the owner without subscribing. Reconnect tracking starts
    /// when a tokio runtime is available.
    pub fn build(self) -> ChannelSubscription {
        let slots = self
            .handlers
            .into_iter()
            .map(|(event, h)| (event, HandlerSlot::new(h)))
            .collect();

        let inner = Arc::new(Inner {
            transport: self.transport,
            connection: self.connection,
            channel: self.channel,
            owner: new_correlation_id(),
            options: self.options,
            callbacks: self.callbacks,
            slots,
            state: Mutex::new(State::new()),
            revision: Revision::new(),
        });

        let watcher = match Handle::try_current() {
            Ok(runtime) => Some(spawn_watcher(&runtime, &inner)),
            Err(_) => {
                debug!(channel = %inner.channel, "No async runtime; reconnect tracking disabled");
                None
            }
        };

        debug!(channel = %inner.channel, owner = %inner.owner, "Channel owner mounted");
        ChannelSubscription {
            inner,
            watcher: Mutex::new(watcher),
        }
    }

    /// Create the owner and, with `auto_subscribe`, start subscribing in
    /// the background. `is_pending()` is true until the transport answers.
    pub fn mount(self) -> ChannelSubscription {
        let subscription = self.build();
        let options = subscription.inner.options;
        if options.enabled && options.auto_subscribe {
            match Handle::try_current() {
                Ok(runtime) => spawn_subscribe(&runtime, &subscription.inner),
                Err(_) => warn!(
                    channel = %subscription.inner.channel,
                    "No async runtime; call subscribe() explicitly"
                ),
            }
        }
        subscription
    }
}

// ---------------------------------------------------------------------------
// Owner handle
// ---------------------------------------------------------------------------

/// One owner's subscription to one channel. Dropping it tears it down.
pub struct ChannelSubscription {
    inner: Arc<Inner>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSubscription {
    pub fn builder(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: impl Into<String>,
    ) -> ChannelSubscriptionBuilder {
        ChannelSubscriptionBuilder {
            transport,
            connection,
            channel: channel.into(),
            handlers: HashMap::new(),
            options: SubscriptionOptions::default(),
            callbacks: LifecycleCallbacks::default(),
        }
    }

    /// Subscribe unless disabled, disconnected, already subscribed or
    /// already pending. Failures are also reported to `on_error`.
    pub async fn subscribe(&self) -> Result<(), RealtimeError> {
        self.inner.subscribe().await
    }

    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }

    /// Add a handler to the active subscription.
    pub fn bind(&self, event: &str, handler: Handler) -> Result<Binding, RealtimeError> {
        let id = match &self.inner.state.lock().phase {
            Phase::Active(id) => id.clone(),
            _ => return Err(RealtimeError::NotSubscribed),
        };

        let slot = HandlerSlot::new(handler);
        let callback = dispatch_wrapper(event, slot.clone(), self.inner.callbacks.on_error.clone());
        let listener = self.inner.transport.bind(&id, event, callback)?;

        let key = {
            let mut state = self.inner.state.lock();
            let still_active = matches!(&state.phase, Phase::Active(current) if *current == id);
            if still_active {
                let key = state.next_binding;
                state.next_binding += 1;
                state.bindings.insert(
                    key,
                    DynamicBinding {
                        subscription: id.clone(),
                        event: event.to_string(),
                        listener,
                    },
                );
                Some(key)
            } else {
                None
            }
        };
        let Some(key) = key else {
            self.inner.transport.unbind(&id, event, listener);
            return Err(RealtimeError::NotSubscribed);
        };

        debug!(channel = %self.inner.channel, event = %event, "Handler bound");
        Ok(Binding {
            inner: Arc::downgrade(&self.inner),
            key,
            event: event.to_string(),
            slot,
        })
    }

    /// Replace the handler registered at build time for `event`. Takes
    /// effect on the next delivery without resubscribing.
    pub fn set_handler(&self, event: &str, handler: Handler) -> bool {
        match self.inner.slots.get(event) {
            Some(slot) => {
                slot.set(handler);
                true
            }
            None => false,
        }
    }

    /// Publish on this owner's channel.
    pub async fn trigger(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, RealtimeError> {
        self.trigger_on(&self.inner.channel, event, payload).await
    }

    /// Publish on an explicit channel.
    pub async fn trigger_on(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, RealtimeError> {
        if !self.inner.connection.is_connected() {
            warn!(channel = %channel, event = %event, "Trigger rejected while disconnected");
            return Err(ConnectionError::NotConnected.into());
        }
        let outcome = self
            .inner
            .transport
            .send_message(event, payload, Some(channel))
            .await?;
        Ok(outcome)
    }

    /// Unmount: stop reconnect tracking, release the subscription, and
    /// discard any subscribe still in flight. Safe to call repeatedly.
    pub fn teardown(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.inner.teardown();
    }

    /// Revision counter bumped on every visible state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Active(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Pending(_))
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state.lock().alive
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match &self.inner.state.lock().phase {
            Phase::Active(id) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn options(&self) -> SubscriptionOptions {
        self.inner.options
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A handler added with `ChannelSubscription::bind`.
pub struct Binding {
    inner: Weak<Inner>,
    key: u64,
    event: String,
    slot: HandlerSlot,
}

impl Binding {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn set_handler(&self, handler: Handler) {
        self.slot.set(handler);
    }

    /// Remove exactly this handler. A no-op once the subscription ended.
    pub fn unbind(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unbind(self.key);
        }
    }
}
