//! Consumer handlers, the swappable slot that holds them, and owner
//! lifecycle callbacks.
//!
//! The callback registered with the transport never changes for the life
//! of a subscription. It dereferences a `HandlerSlot` on every delivery, so
//! replacing the consumer's handler only swaps the slot's target and the
//! next event always reaches the most recent one.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::RealtimeError;
use crate::transport::EventCallback;

/// Error a consumer handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), HandlerError>;

/// A consumer callback for one event.
pub type Handler = Arc<dyn Fn(&serde_json::Value) -> HandlerResult + Send + Sync>;

/// Wrap a closure as a `Handler`.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&serde_json::Value) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Single-slot indirection holding the latest handler.
#[derive(Clone)]
pub struct HandlerSlot {
    target: Arc<RwLock<Handler>>,
}

impl HandlerSlot {
    pub fn new(handler: Handler) -> Self {
        Self {
            target: Arc::new(RwLock::new(handler)),
        }
    }

    /// Point the slot at a new handler.
    pub fn set(&self, handler: Handler) {
        *self.target.write() = handler;
    }

    /// Invoke the current handler. The lock is released before the call so
    /// a handler may replace itself.
    pub fn call(&self, payload: &serde_json::Value) -> HandlerResult {
        let current = Arc::clone(&self.target.read());
        current(payload)
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSlot").finish_non_exhaustive()
    }
}

pub type NotifyCallback = Arc<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&RealtimeError) + Send + Sync>;

/// Optional owner callbacks: `on_connect`, `on_disconnect`, `on_error`.
#[derive(Clone, Default)]
pub struct LifecycleCallbacks {
    pub(crate) on_connect: Option<NotifyCallback>,
    pub(crate) on_disconnect: Option<NotifyCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl LifecycleCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the channel subscription is active.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when an active subscription ends, by unsubscribe or by
    /// connection loss.
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called for subscribe failures and handler errors.
    pub fn on_error(mut self, f: impl Fn(&RealtimeError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn connected(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn disconnected(&self) {
        if let Some(cb) = &self.on_disconnect {
            cb();
        }
    }

    pub(crate) fn error(&self, err: &RealtimeError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }
}

impl fmt::Debug for LifecycleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Build the stable callback stored with the transport for `event`.
///
/// A failing handler is reported to `on_error` and never propagates into
/// the transport's delivery loop.
pub(crate) fn dispatch_wrapper(
    event: &str,
    slot: HandlerSlot,
    on_error: Option<ErrorCallback>,
) -> EventCallback {
    let event = event.to_string();
    Arc::new(move |payload: &serde_json::Value| {
        if let Err(e) = slot.call(payload) {
            let err = RealtimeError::HandlerExecution {
                event: event.clone(),
                message: e.to_string(),
            };
            warn!(event = %event, error = %e, "Event handler failed");
            if let Some(cb) = &on_error {
                cb(&err);
            }
        }
    })
}
