//! `niamoto init`: scaffold a project directory with an empty configuration.

use anyhow::{Context, Result};

const TEMPLATE: &str = r#"version: "1"
import:
  entities:
    datasets: {}
    references: {}
transform: []
export:
  targets: []
"#;

pub fn run(path: Option<String>) -> Result<()> {
    let project_home = path.map(std::path::PathBuf::from).unwrap_or_else(crate::context::project_home);

    std::fs::create_dir_all(&project_home).with_context(|| format!("failed to create {}", project_home.display()))?;
    std::fs::create_dir_all(project_home.join(".niamoto")).with_context(|| "failed to create .niamoto directory")?;

    let config_path = project_home.join("niamoto.yml");
    if config_path.exists() {
        tracing::warn!(path = %config_path.display(), "configuration already exists, leaving it untouched");
    } else {
        std::fs::write(&config_path, TEMPLATE).with_context(|| format!("failed to write {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "wrote configuration template");
    }

    println!("initialized niamoto project at {}", project_home.display());
    Ok(())
}
