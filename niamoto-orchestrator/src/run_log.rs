//! Run summary persistence (§3, §6, §11).
//!
//! `PipelineRun` is ephemeral in memory; this module is what makes it
//! "persisted only as a log artifact" true by appending one row per run (and
//! one row per recorded error) into the reserved `_niamoto_meta.runs` /
//! `run_errors` tables. Append-only: every run ever executed stays queryable.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde_json::json;

use niamoto_core::error::NiamotoError;
use niamoto_core::payload::{PipelineRun, RunPhase, RunStatus};
use niamoto_store::meta::{TABLE_RUNS, TABLE_RUN_ERRORS};
use niamoto_store::AnalyticalStore;

fn runs_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("phase", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("started_at", DataType::Utf8, false),
        Field::new("finished_at", DataType::Utf8, true),
        Field::new("groups_processed", DataType::Int64, false),
        Field::new("groups_total", DataType::Int64, false),
        Field::new("error_count", DataType::Int64, false),
    ]))
}

fn run_errors_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("group", DataType::Utf8, true),
        Field::new("plugin", DataType::Utf8, true),
        Field::new("message", DataType::Utf8, false),
        Field::new("occurred_at", DataType::Utf8, false),
    ]))
}

fn phase_str(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Import => "import",
        RunPhase::Transform => "transform",
        RunPhase::Export => "export",
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithErrors => "completed_with_errors",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

/// Appends `run` (and its recorded errors) onto the `_niamoto_meta.runs` /
/// `run_errors` tables. Reads the existing log back first since
/// `register_table_rows` replaces a table wholesale rather than appending.
pub async fn record(store: &AnalyticalStore, run: &PipelineRun) -> Result<(), NiamotoError> {
    let mut runs = store.execute(&format!("SELECT * FROM {TABLE_RUNS}")).await.unwrap_or_default();
    runs.push(
        json!({
            "id": run.id.to_string(),
            "phase": phase_str(run.phase),
            "status": status_str(run.status),
            "started_at": run.started_at.to_rfc3339(),
            "finished_at": run.finished_at.map(|t| t.to_rfc3339()),
            "groups_processed": run.groups_processed,
            "groups_total": run.groups_total,
            "error_count": run.errors.len() as i64,
        })
        .as_object()
        .cloned()
        .unwrap(),
    );
    store.register_table_rows(TABLE_RUNS, runs, runs_schema()).await?;

    if !run.errors.is_empty() {
        let mut errors = store.execute(&format!("SELECT * FROM {TABLE_RUN_ERRORS}")).await.unwrap_or_default();
        for err in &run.errors {
            errors.push(
                json!({
                    "run_id": run.id.to_string(),
                    "group": err.group,
                    "plugin": err.plugin,
                    "message": err.message,
                    "occurred_at": err.occurred_at.to_rfc3339(),
                })
                .as_object()
                .cloned()
                .unwrap(),
            );
        }
        store.register_table_rows(TABLE_RUN_ERRORS, errors, run_errors_schema()).await?;
    }

    Ok(())
}

/// Reads back every persisted run, most recent first, for the `stats`
/// surface (§11). Returns an empty list if the table hasn't been created yet
/// (no run has ever completed).
pub async fn recent(store: &AnalyticalStore, limit: usize) -> Vec<niamoto_store::Row> {
    let mut rows = store.execute(&format!("SELECT * FROM {TABLE_RUNS}")).await.unwrap_or_default();
    rows.sort_by(|a, b| {
        let a = a["started_at"].as_str().unwrap_or_default();
        let b = b["started_at"].as_str().unwrap_or_default();
        b.cmp(a)
    });
    rows.truncate(limit);
    rows
}
