//! `niamoto import`: datasets, then derived references, then direct references.

use std::sync::Arc;

use anyhow::Result;

use niamoto_core::payload::{PipelineRun, RunPhase};
use niamoto_import::ImportEngine;

use crate::context::Session;

pub async fn run(session: &Session, config: &niamoto_core::config::NiamotoConfig) -> Result<PipelineRun> {
    let engine = ImportEngine::new(Arc::clone(&session.store), Arc::clone(&session.registry), Arc::clone(&session.plugins));

    let mut pipeline_run = PipelineRun::start(RunPhase::Import, config.import.entities.datasets.len() as u64 + config.import.entities.references.len() as u64);

    match engine.run(&config.import).await {
        Ok(results) => {
            pipeline_run.groups_processed = results.len() as u64;
            for result in &results {
                for warning in &result.warnings {
                    pipeline_run.record_error(Some(result.entity.clone()), None, warning.clone());
                }
                println!("{}: {} rows ({} rejected)", result.entity, result.row_count, result.rejected);
            }
            Ok(pipeline_run.finish())
        }
        Err(e) => {
            tracing::error!("import failed: {e}");
            Ok(pipeline_run.fail(e.to_string()))
        }
    }
}
