//! Process context: resolves `PROJECT_HOME`/`STORE_PATH`, loads the
//! configuration document, and wires up the store/registry/plugin registry
//! every subcommand needs (§6).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use niamoto_core::config::NiamotoConfig;
use niamoto_plugins::PluginRegistry;
use niamoto_registry::EntityRegistry;
use niamoto_store::AnalyticalStore;

pub struct Session {
    pub store: Arc<AnalyticalStore>,
    pub registry: Arc<EntityRegistry>,
    pub plugins: Arc<PluginRegistry>,
}

/// `PROJECT_HOME` defaults to the current directory; `STORE_PATH` defaults
/// to `<project_home>/.niamoto/store`.
pub fn project_home() -> PathBuf {
    std::env::var("PROJECT_HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

pub fn store_path(project_home: &std::path::Path) -> PathBuf {
    std::env::var("STORE_PATH").map(PathBuf::from).unwrap_or_else(|_| project_home.join(".niamoto").join("store"))
}

fn config_path(project_home: &std::path::Path, config_arg: Option<&str>) -> PathBuf {
    match config_arg {
        Some(path) => PathBuf::from(path),
        None => project_home.join("niamoto.yml"),
    }
}

pub fn load_config(project_home: &std::path::Path, config_arg: Option<&str>) -> Result<NiamotoConfig> {
    let path = config_path(project_home, config_arg);
    let text = std::fs::read_to_string(&path).with_context(|| format!("failed to read configuration at {}", path.display()))?;
    NiamotoConfig::from_yaml(&text).with_context(|| format!("failed to parse configuration at {}", path.display()))
}

/// Opens the store and warms up the registry, registering every built-in
/// plugin from `niamoto-plugins` and `niamoto-export`.
pub async fn open(project_home: PathBuf) -> Result<Session> {
    let store = Arc::new(AnalyticalStore::open(store_path(&project_home)).await.context("failed to open analytical store")?);
    let registry = Arc::new(EntityRegistry::new(Arc::clone(&store)));
    registry.warm_up().await.context("failed to warm up entity registry")?;

    let plugins = Arc::new(PluginRegistry::new());
    niamoto_plugins::register_builtins(&plugins).context("failed to register built-in transformer plugins")?;
    niamoto_export::register_builtins(&plugins).context("failed to register built-in exporter plugins")?;

    Ok(Session { store, registry, plugins })
}
