//! `niamoto run`: import, transform, and export in one pass, sharing the
//! transform orchestrator's payload store with the export phase.

use anyhow::Result;

use crate::commands::{export, import, transform};
use crate::context::Session;

pub async fn run(session: &Session, config: &niamoto_core::config::NiamotoConfig) -> Result<()> {
    let import_run = import::run(session, config).await?;
    niamoto_orchestrator::run_log::record(&session.store, &import_run).await?;

    let (transform_run, orchestrator) = transform::run(session, config).await?;
    niamoto_orchestrator::run_log::record(&session.store, &transform_run).await?;

    let export_run = export::run(session, config, orchestrator.payload_store()).await?;
    niamoto_orchestrator::run_log::record(&session.store, &export_run).await?;

    println!(
        "import: {} processed, transform: {} groups, export: {} targets",
        import_run.groups_processed, transform_run.groups_processed, export_run.groups_processed
    );
    Ok(())
}
