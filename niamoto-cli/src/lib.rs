//! Command-line surface (§6): `init`, `import`, `transform`, `export`,
//! `run`, `stats`. Argument parsing lives in [`args`]; each subcommand's
//! orchestration lives under [`commands`].

pub mod args;
pub mod commands;
pub mod context;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command};

/// Installs a `tracing` subscriber driven by `LOG_LEVEL` (§6), defaulting to
/// `info` when unset. Call once, before [`run`].
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { path } => commands::init::run(path),
        Command::Import { config } => {
            let project_home = context::project_home();
            let session = context::open(project_home.clone()).await?;
            let niamoto_config = context::load_config(&project_home, config.as_deref())?;
            let pipeline_run = commands::import::run(&session, &niamoto_config).await?;
            niamoto_orchestrator::run_log::record(&session.store, &pipeline_run).await?;
            Ok(())
        }
        Command::Transform { config } => {
            let project_home = context::project_home();
            let session = context::open(project_home.clone()).await?;
            let niamoto_config = context::load_config(&project_home, config.as_deref())?;
            let (pipeline_run, _orchestrator) = commands::transform::run(&session, &niamoto_config).await?;
            niamoto_orchestrator::run_log::record(&session.store, &pipeline_run).await?;
            Ok(())
        }
        Command::Export { config } => {
            let project_home = context::project_home();
            let session = context::open(project_home.clone()).await?;
            let niamoto_config = context::load_config(&project_home, config.as_deref())?;
            let payloads = Arc::new(niamoto_orchestrator::PayloadStore::new());
            let pipeline_run = commands::export::run(&session, &niamoto_config, payloads).await?;
            niamoto_orchestrator::run_log::record(&session.store, &pipeline_run).await?;
            Ok(())
        }
        Command::Run { config } => {
            let project_home = context::project_home();
            let session = context::open(project_home.clone()).await?;
            let niamoto_config = context::load_config(&project_home, config.as_deref())?;
            commands::run::run(&session, &niamoto_config).await
        }
        Command::Stats { recent } => {
            let project_home = context::project_home();
            let session = context::open(project_home).await?;
            commands::stats::run(&session, recent).await
        }
    }
    .context("command failed")
}
