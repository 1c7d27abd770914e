//! Transform/Export Orchestrator (C5), export half.
//!
//! Drives every configured export target against the payload store,
//! honoring each exporter's declared style (per-group vs whole-archive) and
//! recording failures without aborting the rest of the export pass (§4.5,
//! §7: export errors are recoverable).

use std::path::Path;
use std::sync::Arc;

use niamoto_core::config::ExportTarget;
use niamoto_core::error::{ErrorContext, NiamotoError};
use niamoto_core::payload::{PipelineRun, RunPhase};
use niamoto_plugins::PluginRegistry;

use crate::payload_store::PayloadStore;

pub struct ExportOrchestrator {
    plugins: Arc<PluginRegistry>,
    payloads: Arc<PayloadStore>,
}

impl ExportOrchestrator {
    pub fn new(plugins: Arc<PluginRegistry>, payloads: Arc<PayloadStore>) -> Self {
        Self { plugins, payloads }
    }

    /// Runs every export target. Per-group and whole-archive exporters over
    /// the same entity are both permitted (§9 decision); they are required
    /// to write to disjoint files, which this orchestrator does not itself
    /// verify.
    pub async fn run(&self, targets: &[ExportTarget]) -> Result<PipelineRun, NiamotoError> {
        let mut run = PipelineRun::start(RunPhase::Export, targets.len() as u64);

        for target in targets {
            match self.run_target(target).await {
                Ok(()) => {}
                Err(e) => run.record_error(None, Some(target.exporter.clone()), e.to_string()),
            }
            run.groups_processed += 1;
        }

        Ok(run.finish())
    }

    async fn run_target(&self, target: &ExportTarget) -> Result<(), niamoto_core::error::ExportError> {
        let exporter = self.plugins.exporter(&target.exporter).ok_or_else(|| niamoto_core::error::ExportError {
            message: format!("unknown exporter plugin `{}`", target.exporter),
            context: ErrorContext::default().with_plugin(&target.exporter),
        })?;

        let params = exporter
            .param_schema()
            .validate(&target.exporter, &target_params_as_map(target))
            .map_err(|e| niamoto_core::error::ExportError { message: e.message, context: e.context })?;

        let out_dir = Path::new(&target.params.output_dir);
        std::fs::create_dir_all(out_dir).map_err(|e| niamoto_core::error::ExportError {
            message: format!("failed to create output directory {}: {e}", out_dir.display()),
            context: ErrorContext::default().with_plugin(&target.exporter),
        })?;

        for group in &target.params.groups {
            let widgets: Vec<String> = group.widgets.clone();
            let payloads = self.payloads.get(&group.entity, Some(&widgets));
            exporter.export(&payloads, &params, out_dir).await.map_err(|e| niamoto_core::error::ExportError {
                message: e.message,
                context: e.context,
            })?;
        }

        Ok(())
    }
}

fn target_params_as_map(target: &ExportTarget) -> std::collections::HashMap<String, serde_json::Value> {
    let mut map = target.params.params.clone();
    map.insert("output_dir".to_string(), serde_json::json!(target.params.output_dir));
    map.insert("deterministic_timestamps".to_string(), serde_json::json!(target.params.deterministic_timestamps));
    map
}
