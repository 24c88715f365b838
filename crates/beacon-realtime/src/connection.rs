//! Shared connection state.
//!
//! One `ConnectionSupervisor` is created at application start and torn
//! down at shutdown. It is the only writer of the connection state; every
//! owner receives a read-only `ConnectionHandle` and reacts to transitions
//! through the underlying watch channel.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connectivity of the shared transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the shared connection state. Written only by transport signals.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Forward a transport connectivity signal.
    ///
    /// Returns `true` if the state actually changed; repeated signals are ignored.
    pub fn signal(&self, state: ConnectionState) -> bool {
        let mut previous = state;
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            previous = *current;
            *current = state;
            true
        });

        if changed {
            match state {
                ConnectionState::Connected => info!(from = %previous, "Transport connected"),
                ConnectionState::Failed => warn!(from = %previous, "Transport failed"),
                _ => info!(from = %previous, to = %state, "Connection state changed"),
            }
        } else {
            debug!(state = %state, "Ignoring repeated connection signal");
        }
        changed
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Read-only view handed to every owner.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Mark the connection as gone for good. Owners observe a final
    /// `Disconnected` transition and their watchers stop once the
    /// supervisor is dropped.
    pub fn shutdown(&self) {
        self.signal(ConnectionState::Disconnected);
        info!(observers = self.tx.receiver_count(), "Connection supervisor shut down");
    }
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, read-only view of the shared connection state.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// A fresh receiver for transition-driven consumers.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Wait for the next state change. Returns `None` once the supervisor is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
