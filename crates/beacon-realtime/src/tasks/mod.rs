//! Background task progress mirrored from `<domain>-<kind>` events.

mod multi;
mod tracker;
mod types;


pub use multi::MultiTaskTracker;
pub use tracker::TaskTracker;
pub use types::{
    organization_channel, TaskDomain, TaskEventKind, TaskEventPayload, TaskProgressRecord,
    TaskStatus, DEFAULT_CHANNEL_PREFIX,
};

use std::sync::Arc;

use crate::handler::{handler, Handler};

/// One handler per domain and kind, each decoding the payload and passing
/// it to `route`. A payload that does not decode is a handler error.
fn task_handlers<F>(domains: &[TaskDomain], route: F) -> Vec<(String, Handler)>
where
    F: Fn(TaskEventKind, &TaskEventPayload) + Send + Sync + 'static,
{
    let route = Arc::new(route);
    domains
        .iter()
        .flat_map(TaskDomain::event_names)
        .map(|(kind, event)| {
            let route = Arc::clone(&route);
            let h = handler(move |payload: &serde_json::Value| {
                let payload: TaskEventPayload = serde_json::from_value(payload.clone())?;
                route(kind, &payload);
                Ok(())
            });
            (event, h)
        })
        .collect()
}
