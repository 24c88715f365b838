//! Event listening in two modes.
//!
//! Global listeners register directly on the transport-wide bus. Channel
//! listeners own a `ChannelSubscription` whose handler table holds the
//! listener's events, so the whole subscription goes away with the
//! listener. In both modes the transport only ever sees the stable
//! dispatch wrapper; `set_handler` swaps the slot behind it.

use std::sync::Arc;

use beacon_common::ListenerId;
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::ConnectionHandle;
use crate::handler::{dispatch_wrapper, Handler, HandlerSlot, LifecycleCallbacks};
use crate::subscription::{ChannelSubscription, SubscriptionOptions};
use crate::transport::Transport;

/// Options for channel-scoped listeners.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub subscription: SubscriptionOptions,
    pub callbacks: LifecycleCallbacks,
}

struct GlobalListener {
    transport: Arc<dyn Transport>,
    event: String,
    slot: HandlerSlot,
    listener: Mutex<Option<ListenerId>>,
}

impl GlobalListener {
    fn release(&self) {
        if let Some(listener) = self.listener.lock().take() {
            self.transport.off(&self.event, listener);
            debug!(event = %self.event, "Global listener removed");
        }
    }
}

enum Mode {
    Global(GlobalListener),
    Channel(ChannelSubscription),
}

/// A registered event listener. Dropping it unbinds.
pub struct EventListener {
    mode: Mode,
}

impl EventListener {
    /// Listen on the transport-wide bus.
    pub fn global(
        transport: Arc<dyn Transport>,
        event: &str,
        handler: Handler,
        callbacks: LifecycleCallbacks,
    ) -> Self {
        let slot = HandlerSlot::new(handler);
        let listener = transport.on(event, dispatch_wrapper(event, slot.clone(), callbacks.on_error));
        debug!(event = %event, listener = %listener, "Global listener added");
        Self {
            mode: Mode::Global(GlobalListener {
                transport,
                event: event.to_string(),
                slot,
                listener: Mutex::new(Some(listener)),
            }),
        }
    }

    /// Listen for one event on `channel` through its own subscription.
    pub fn channel(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: &str,
        event: &str,
        handler: Handler,
        options: ListenerOptions,
    ) -> Self {
        Self::channel_many(transport, connection, channel, [(event, handler)], options)
    }

    /// Listen for several events on `channel` through one subscription.
    pub fn channel_many<I, S>(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: &str,
        handlers: I,
        options: ListenerOptions,
    ) -> Self
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: Into<String>,
    {
        let subscription = ChannelSubscription::builder(transport, connection, channel)
            .handlers(handlers)
            .options(options.subscription)
            .callbacks(options.callbacks)
            .mount();
        Self {
            mode: Mode::Channel(subscription),
        }
    }

    /// Global when `channel` is `None`, channel-scoped otherwise.
    pub fn on(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        event: &str,
        handler: Handler,
        channel: Option<&str>,
        options: ListenerOptions,
    ) -> Self {
        match channel {
            Some(channel) => Self::channel(transport, connection, channel, event, handler, options),
            None => Self::global(transport, event, handler, options.callbacks),
        }
    }

    /// Point `event` at a new handler without touching the transport.
    /// Returns false if this listener does not handle `event`.
    pub fn set_handler(&self, event: &str, handler: Handler) -> bool {
        match &self.mode {
            Mode::Global(global) if global.event == event => {
                global.slot.set(handler);
                true
            }
            Mode::Global(_) => false,
            Mode::Channel(subscription) => subscription.set_handler(event, handler),
        }
    }

    /// The backing subscription of a channel-scoped listener.
    pub fn subscription(&self) -> Option<&ChannelSubscription> {
        match &self.mode {
            Mode::Channel(subscription) => Some(subscription),
            Mode::Global(_) => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.mode, Mode::Global(_))
    }

    pub fn teardown(&self) {
        match &self.mode {
            Mode::Global(global) => global.release(),
            Mode::Channel(subscription) => subscription.teardown(),
        }
    }

    pub fn unbind(self) {
        self.teardown();
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionState, ConnectionSupervisor};
    use crate::error::RealtimeError;
    use crate::handler::handler;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(hits: &Arc<AtomicUsize>) -> Handler {
        let hits = Arc::clone(hits);
        handler(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn error_sink(errors: &Arc<Mutex<Vec<String>>>) -> LifecycleCallbacks {
        let errors = Arc::clone(errors);
        LifecycleCallbacks::new().on_error(move |e: &RealtimeError| errors.lock().push(e.to_string()))
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn global_listener_calls_latest_handler() {
        let memory = Arc::new(MemoryTransport::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let listener = EventListener::global(
            memory.clone(),
            "tick",
            counter(&first),
            LifecycleCallbacks::default(),
        );
        memory.emit_global("tick", json!(1));
        assert!(listener.set_handler("tick", counter(&second)));
        assert!(!listener.set_handler("tock", counter(&second)));
        memory.emit_global("tick", json!(2));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(memory.calls().on, 1);
    }

    #[test]
    fn global_unbind_calls_off_once() {
        let memory = Arc::new(MemoryTransport::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let listener =
            EventListener::global(memory.clone(), "tick", counter(&hits), LifecycleCallbacks::default());

        listener.teardown();
        listener.unbind();

        assert_eq!(memory.calls().off, 1);
        assert_eq!(memory.global_listener_count("tick"), 0);
    }

    #[test]
    fn global_handler_error_is_isolated() {
        let memory = Arc::new(MemoryTransport::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = EventListener::global(
            memory.clone(),
            "tick",
            handler(|_| Err("boom".into())),
            error_sink(&errors),
        );
        let _good =
            EventListener::global(memory.clone(), "tick", counter(&hits), LifecycleCallbacks::default());

        assert_eq!(memory.emit_global("tick", json!({})), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*errors.lock(), vec!["handler for 'tick' failed: boom"]);
    }

    #[tokio::test]
    async fn channel_listener_owns_its_subscription() {
        let memory = Arc::new(MemoryTransport::new());
        let supervisor = ConnectionSupervisor::new();
        supervisor.signal(ConnectionState::Connected);
        let hits = Arc::new(AtomicUsize::new(0));

        let listener = EventListener::channel(
            memory.clone(),
            supervisor.handle(),
            "lesson-42",
            "ping",
            counter(&hits),
            ListenerOptions::default(),
        );
        settle().await;

        assert!(!listener.is_global());
        assert!(listener.subscription().is_some_and(ChannelSubscription::is_subscribed));
        memory.emit("lesson-42", "ping", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(listener);
        assert_eq!(memory.calls().subscribe, 1);
        assert_eq!(memory.calls().unsubscribe, 1);
    }

    #[tokio::test]
    async fn channel_many_uses_one_subscription() {
        let memory = Arc::new(MemoryTransport::new());
        let supervisor = ConnectionSupervisor::new();
        supervisor.signal(ConnectionState::Connected);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let _listener = EventListener::channel_many(
            memory.clone(),
            supervisor.handle(),
            "x",
            [("first", counter(&a)), ("second", counter(&b))],
            ListenerOptions::default(),
        );
        settle().await;

        memory.emit("x", "first", json!({}));
        memory.emit("x", "second", json!({}));
        assert_eq!(memory.calls().subscribe, 1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_subscribe_failure_reaches_on_error() {
        let memory = Arc::new(MemoryTransport::new());
        memory.fail_subscribes(Some("forbidden"));
        let supervisor = ConnectionSupervisor::new();
        supervisor.signal(ConnectionState::Connected);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let listener = EventListener::channel(
            memory.clone(),
            supervisor.handle(),
            "x",
            "ping",
            counter(&hits),
            ListenerOptions {
                callbacks: error_sink(&errors),
                ..ListenerOptions::default()
            },
        );
        settle().await;

        assert!(listener.subscription().is_some_and(|s| !s.is_subscribed()));
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("forbidden"));
    }

    #[tokio::test]
    async fn on_selects_mode_from_channel_option() {
        let memory = Arc::new(MemoryTransport::new());
        let supervisor = ConnectionSupervisor::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let global = EventListener::on(
            memory.clone(),
            supervisor.handle(),
            "tick",
            counter(&hits),
            None,
            ListenerOptions::default(),
        );
        let scoped = EventListener::on(
            memory.clone(),
            supervisor.handle(),
            "tick",
            counter(&hits),
            Some("x"),
            ListenerOptions::default(),
        );

        assert!(global.is_global());
        assert!(!scoped.is_global());
    }
}
