//! Follows a single task through its lifecycle events.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::types::{TaskDomain, TaskEventKind, TaskEventPayload, TaskProgressRecord, TaskStatus};
use crate::connection::ConnectionHandle;
use crate::dispatcher::ListenerOptions;
use crate::revision::Revision;
use crate::subscription::ChannelSubscription;
use crate::transport::Transport;

struct TrackerState {
    record: Mutex<TaskProgressRecord>,
    revision: Revision,
}

impl TrackerState {
    fn route(&self, kind: TaskEventKind, payload: &TaskEventPayload) {
        let applied = {
            let mut record = self.record.lock();
            if payload.task_id != record.task_id {
                debug!(task = %payload.task_id, tracked = %record.task_id, "Ignoring event for another task");
                return;
            }
            record.apply(kind, payload, Utc::now())
        };
        if applied {
            debug!(task = %payload.task_id, kind = kind.suffix(), "Task record updated");
            self.revision.bump();
        } else {
            debug!(task = %payload.task_id, kind = kind.suffix(), "Dropping out-of-order task event");
        }
    }
}

/// Follows a single task over the four lifecycle events of one domain.
pub struct TaskTracker {
    state: Arc<TrackerState>,
    subscription: ChannelSubscription,
}

impl TaskTracker {
    pub fn mount(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: &str,
        domain: TaskDomain,
        task_id: impl Into<String>,
        options: ListenerOptions,
    ) -> Self {
        let state = Arc::new(TrackerState {
            record: Mutex::new(TaskProgressRecord::new(task_id)),
            revision: Revision::new(),
        });

        let routed = Arc::clone(&state);
        let handlers = super::task_handlers(std::slice::from_ref(&domain), move |kind, payload| {
            routed.route(kind, payload)
        });
        let subscription = ChannelSubscription::builder(transport, connection, channel)
            .handlers(handlers)
            .options(options.subscription)
            .callbacks(options.callbacks)
            .mount();

        info!(channel = %channel, domain = %domain, task = %state.record.lock().task_id, "Tracking task");
        Self {
            state,
            subscription,
        }
    }

    pub fn record(&self) -> TaskProgressRecord {
        self.state.record.lock().clone()
    }

    pub fn task_id(&self) -> String {
        self.state.record.lock().task_id.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.record.lock().status
    }

    pub fn progress(&self) -> f64 {
        self.state.record.lock().progress
    }

    pub fn is_tracking(&self) -> bool {
        self.state.record.lock().is_tracking
    }

    /// Follow a different task from a fresh record.
    pub fn track(&self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        info!(task = %task_id, "Retargeting task tracker");
        *self.state.record.lock() = TaskProgressRecord::new(task_id);
        self.state.revision.bump();
    }

    pub fn reset(&self) {
        self.state.record.lock().reset();
        self.state.revision.bump();
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.state.revision.subscribe()
    }

    pub fn subscription(&self) -> &ChannelSubscription {
        &self.subscription
    }

    pub fn teardown(&self) {
        self.subscription.teardown();
    }
}
