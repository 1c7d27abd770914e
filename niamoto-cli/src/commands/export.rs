//! `niamoto export`: drives every configured export target against a payload store.

use std::sync::Arc;

use anyhow::Result;

use niamoto_core::payload::PipelineRun;
use niamoto_orchestrator::{ExportOrchestrator, PayloadStore};

use crate::context::Session;

/// Runs export against `payloads`. A bare `niamoto export` invocation (no
/// preceding `transform` in the same process) has nothing in the payload
/// store and every target degenerates to an empty archive; `niamoto run`
/// shares one orchestrator's payload store across both phases instead.
pub async fn run(session: &Session, config: &niamoto_core::config::NiamotoConfig, payloads: Arc<PayloadStore>) -> Result<PipelineRun> {
    let orchestrator = ExportOrchestrator::new(Arc::clone(&session.plugins), payloads);
    let pipeline_run = orchestrator.run(&config.export.targets).await?;
    for error in &pipeline_run.errors {
        tracing::warn!(plugin = ?error.plugin, "{}", error.message);
    }
    Ok(pipeline_run)
}
