//! Task records, statuses, domains and lifecycle event names.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the organization channel carrying task events.
pub const DEFAULT_CHANNEL_PREFIX: &str = "organization";

/// Channel on which an organization's background tasks report.
pub fn organization_channel(prefix: &str, org_id: &str) -> String {
    format!("{prefix}.{org_id}")
}

/// Lifecycle of a background task as mirrored locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Queued => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four task lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    Started,
    Progress,
    Completed,
    Failed,
}

impl TaskEventKind {
    pub const ALL: [TaskEventKind; 4] = [
        TaskEventKind::Started,
        TaskEventKind::Progress,
        TaskEventKind::Completed,
        TaskEventKind::Failed,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            TaskEventKind::Started => "started",
            TaskEventKind::Progress => "progress",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Failed => "failed",
        }
    }

    /// Wire name of this event for `domain`, e.g. `import-progress`.
    pub fn event_name(self, domain: &TaskDomain) -> String {
        format!("{}-{}", domain.as_str(), self.suffix())
    }

    fn target_status(self) -> TaskStatus {
        match self {
            TaskEventKind::Started | TaskEventKind::Progress => TaskStatus::Processing,
            TaskEventKind::Completed => TaskStatus::Completed,
            TaskEventKind::Failed => TaskStatus::Failed,
        }
    }
}

/// Job family whose events share a name prefix, e.g. `import`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDomain(String);

impl TaskDomain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn import() -> Self {
        Self::new("import")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every `<domain>-<kind>` event name.
    pub fn event_names(&self) -> Vec<(TaskEventKind, String)> {
        TaskEventKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.event_name(self)))
            .collect()
    }
}

impl fmt::Display for TaskDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a task lifecycle event. Absent fields leave the record as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEventPayload {
    pub task_id: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Local mirror of one background task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgressRecord {
    pub task_id: String,
    pub status: TaskStatus,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_tracking: bool,
}

impl TaskProgressRecord {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Queued,
            progress: 0.0,
            message: None,
            error: None,
            result: None,
            started_at: None,
            completed_at: None,
            is_tracking: true,
        }
    }

    /// Merge one event into the record. Returns false when the event was
    /// dropped: after a terminal state nothing is applied, and status
    /// never moves backwards.
    pub fn apply(
        &mut self,
        kind: TaskEventKind,
        payload: &TaskEventPayload,
        now: DateTime<Utc>,
    ) -> bool {
        let target = kind.target_status();
        if self.status.is_terminal() || target.rank() < self.status.rank() {
            return false;
        }

        if self.status == TaskStatus::Queued {
            self.started_at = Some(now);
        }
        if let Some(progress) = payload.progress.filter(|p| p.is_finite()) {
            self.progress = progress.clamp(0.0, 100.0);
        } else if kind == TaskEventKind::Completed {
            self.progress = 100.0;
        }
        if let Some(message) = &payload.message {
            self.message = Some(message.clone());
        }
        if let Some(error) = &payload.error {
            self.error = Some(error.clone());
        }
        if let Some(result) = &payload.result {
            self.result = Some(result.clone());
        }

        self.status = target;
        if target.is_terminal() {
            self.completed_at = Some(now);
            self.is_tracking = false;
        }
        true
    }

    /// Back to `{ queued, 0, is_tracking }` for the same task.
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.task_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(task_id: &str) -> TaskEventPayload {
        TaskEventPayload {
            task_id: task_id.into(),
            ..TaskEventPayload::default()
        }
    }

    #[test]
    fn event_names_follow_domain_convention() {
        let domain = TaskDomain::import();
        assert_eq!(TaskEventKind::Progress.event_name(&domain), "import-progress");
        assert_eq!(
            TaskEventKind::Failed.event_name(&TaskDomain::new("export")),
            "export-failed"
        );
        assert_eq!(domain.event_names().len(), 4);
    }

    #[test]
    fn organization_channel_uses_prefix() {
        assert_eq!(organization_channel("organization", "42"), "organization.42");
    }

    #[test]
    fn status_moves_forward_only() {
        let now = Utc::now();
        let mut record = TaskProgressRecord::new("t1");

        assert!(record.apply(TaskEventKind::Started, &payload("t1"), now));
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.started_at, Some(now));

        let mut progress = payload("t1");
        progress.progress = Some(40.0);
        assert!(record.apply(TaskEventKind::Progress, &progress, now));
        assert_eq!(record.progress, 40.0);

        assert!(record.apply(TaskEventKind::Completed, &payload("t1"), now));
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100.0);
        assert!(!record.is_tracking);
        assert_eq!(record.completed_at, Some(now));

        progress.progress = Some(60.0);
        assert!(!record.apply(TaskEventKind::Progress, &progress, now));
        assert!(!record.apply(TaskEventKind::Failed, &payload("t1"), now));
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100.0);
    }

    #[test]
    fn missing_fields_keep_prior_values() {
        let now = Utc::now();
        let mut record = TaskProgressRecord::new("t1");
        let mut first = payload("t1");
        first.progress = Some(10.0);
        first.message = Some("reading rows".into());
        record.apply(TaskEventKind::Progress, &first, now);

        record.apply(TaskEventKind::Progress, &payload("t1"), now);

        assert_eq!(record.progress, 10.0);
        assert_eq!(record.message.as_deref(), Some("reading rows"));
    }

    #[test]
    fn progress_is_clamped() {
        let now = Utc::now();
        let mut record = TaskProgressRecord::new("t1");
        let mut event = payload("t1");

        event.progress = Some(150.0);
        record.apply(TaskEventKind::Progress, &event, now);
        assert_eq!(record.progress, 100.0);

        event.progress = Some(-5.0);
        record.apply(TaskEventKind::Progress, &event, now);
        assert_eq!(record.progress, 0.0);
    }

    #[test]
    fn failure_keeps_error_and_stops_tracking() {
        let mut record = TaskProgressRecord::new("t1");
        let mut event = payload("t1");
        event.error = Some("bad header".into());

        assert!(record.apply(TaskEventKind::Failed, &event, Utc::now()));
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("bad header"));
        assert!(!record.is_tracking);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut record = TaskProgressRecord::new("t1");
        record.apply(TaskEventKind::Completed, &payload("t1"), Utc::now());

        record.reset();

        assert_eq!(record, TaskProgressRecord::new("t1"));
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.progress, 0.0);
        assert!(record.is_tracking);
    }

    #[test]
    fn payload_fields_are_optional() {
        let parsed: TaskEventPayload =
            serde_json::from_value(serde_json::json!({ "task_id": "t9" })).unwrap();
        assert_eq!(parsed, payload("t9"));
    }
}
