//! Run bookkeeping and widget output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Import,
    Transform,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

/// One error recorded against a run without aborting it, per the
/// failure-isolation rule for transform/export plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub group: Option<String>,
    pub plugin: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Ephemeral record of a single `import`/`transform`/`export`/`run`
/// invocation. Persisted only as a log artifact in `_niamoto_meta.runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub errors: Vec<RunError>,
    pub groups_processed: u64,
    pub groups_total: u64,
}

impl PipelineRun {
    pub fn start(phase: RunPhase, groups_total: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            errors: Vec::new(),
            groups_processed: 0,
            groups_total,
        }
    }

    pub fn record_error(&mut self, group: Option<String>, plugin: Option<String>, message: impl Into<String>) {
        self.errors.push(RunError {
            group,
            plugin,
            message: message.into(),
            occurred_at: Utc::now(),
        });
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.status = if self.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        self
    }

    pub fn cancel(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.status = RunStatus::Cancelled;
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.record_error(None, None, message);
        self.finished_at = Some(Utc::now());
        self.status = RunStatus::Failed;
        self
    }
}

/// Output of a single widget transformer invocation for one group, stored
/// in the orchestrator's payload store and consumed by exporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetPayload {
    pub group_key: String,
    pub widget_id: String,
    pub data: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

impl WidgetPayload {
    pub fn new(group_key: impl Into<String>, widget_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            group_key: group_key.into(),
            widget_id: widget_id.into(),
            data,
            generated_at: Utc::now(),
        }
    }
}
