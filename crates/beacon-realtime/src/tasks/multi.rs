//! Tracks many tasks across one or more domains.

use std::collections::BTreeMap;
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

struct MultiState {
    tasks: Mutex<BTreeMap<String, TaskProgressRecord>>,
    revision: Revision,
}

impl MultiState {
    fn route(&self, kind: TaskEventKind, payload: &TaskEventPayload) {
        let applied = {
            let mut tasks = self.tasks.lock();
            let Some(record) = tasks.get_mut(&payload.task_id) else {
                debug!(task = %payload.task_id, "Ignoring event for untracked task");
                return;
            };
            record.apply(kind, payload, Utc::now())
        };
        if applied {
            self.revision.bump();
        } else {
            debug!(task = %payload.task_id, kind = kind.suffix(), "Dropping out-of-order task event");
        }
    }

    fn with_status(&self, status: TaskStatus) -> Vec<TaskProgressRecord> {
        self.tasks
            .lock()
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect()
    }
}

/// Follows any number of tasks through one shared subscription.
///
/// Events are routed by `task_id`; ids that were never added are ignored.
pub struct MultiTaskTracker {
    state: Arc<MultiState>,
    subscription: ChannelSubscription,
}

impl MultiTaskTracker {
    pub fn mount(
        transport: Arc<dyn Transport>,
        connection: ConnectionHandle,
        channel: &str,
        domains: &[TaskDomain],
        options: ListenerOptions,
    ) -> Self {
        let state = Arc::new(MultiState {
            tasks: Mutex::new(BTreeMap::new()),
            revision: Revision::new(),
        });

        let routed = Arc::clone(&state);
        let handlers = super::task_handlers(domains, move |kind, payload| routed.route(kind, payload));
        let subscription = ChannelSubscription::builder(transport, connection, channel)
            .handlers(handlers)
            .options(options.subscription)
            .callbacks(options.callbacks)
            .mount();

        info!(channel = %channel, domains = domains.len(), "Multi-task tracker mounted");
        Self {
            state,
            subscription,
        }
    }

    /// Start tracking `task_id` from a queued record. Returns false if it
    /// is already tracked; the existing record is kept.
    pub fn add_task(&self, task_id: impl Into<String>) -> bool {
        let task_id = task_id.into();
        let added = {
            let mut tasks = self.state.tasks.lock();
            if tasks.contains_key(&task_id) {
                false
            } else {
                tasks.insert(task_id.clone(), TaskProgressRecord::new(task_id.clone()));
                true
            }
        };
        if added {
            debug!(task = %task_id, "Task added");
            self.state.revision.bump();
        }
        added
    }

    pub fn remove_task(&self, task_id: &str) -> Option<TaskProgressRecord> {
        let removed = self.state.tasks.lock().remove(task_id);
        if removed.is_some() {
            debug!(task = %task_id, "Task removed");
            self.state.revision.bump();
        }
        removed
    }

    pub fn get(&self, task_id: &str) -> Option<TaskProgressRecord> {
        self.state.tasks.lock().get(task_id).cloned()
    }

    /// All tracked tasks, ordered by id.
    pub fn tasks(&self) -> Vec<TaskProgressRecord> {
        self.state.tasks.lock().values().cloned().collect()
    }

    /// Tasks currently processing.
    pub fn active(&self) -> Vec<TaskProgressRecord> {
        self.state.with_status(TaskStatus::Processing)
    }

    pub fn completed(&self) -> Vec<TaskProgressRecord> {
        self.state.with_status(TaskStatus::Completed)
    }

    pub fn failed(&self) -> Vec<TaskProgressRecord> {
        self.state.with_status(TaskStatus::Failed)
    }

    pub fn len(&self) -> usize {
        self.state.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.tasks.lock().is_empty()
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
