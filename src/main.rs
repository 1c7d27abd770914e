//! Niamoto command-line entry point.
//!
//! Thin binary shell: all argument parsing and command dispatch lives in
//! `niamoto_cli`, keeping the root binary crate separate from the library
//! crate that holds the actual orchestration.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    niamoto_cli::init_logging();

    if let Err(err) = niamoto_cli::run().await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }

    Ok(())
}
