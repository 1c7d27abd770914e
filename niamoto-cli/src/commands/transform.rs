//! `niamoto transform`: runs every declared transform section.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use niamoto_core::payload::PipelineRun;
use niamoto_orchestrator::TransformOrchestrator;

use crate::context::Session;

pub async fn run(session: &Session, config: &niamoto_core::config::NiamotoConfig) -> Result<(PipelineRun, Arc<TransformOrchestrator>)> {
    let orchestrator = Arc::new(TransformOrchestrator::new(Arc::clone(&session.store), Arc::clone(&session.registry), Arc::clone(&session.plugins)));

    let pipeline_run = orchestrator.run(&config.transform, CancellationToken::new(), None).await?;
    for error in &pipeline_run.errors {
        tracing::warn!(group = ?error.group, plugin = ?error.plugin, "{}", error.message);
    }

    Ok((pipeline_run, orchestrator))
}
