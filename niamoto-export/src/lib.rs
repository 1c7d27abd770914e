//! Built-in exporter plugins (§4.5): `html_page`, `json_api`, and
//! `darwin_core_archive`.

pub mod darwin_core;
pub mod html;
pub mod json_api;

use std::sync::Arc;

use niamoto_core::error::RegistryError;
use niamoto_plugins::PluginRegistry;

/// Registers every built-in exporter. All three declare `output_dir` and
/// `deterministic_timestamps` in their param schema since the orchestrator
/// always supplies both (§4.5).
pub fn register_builtins(registry: &PluginRegistry) -> Result<(), RegistryError> {
    registry.register_exporter(Arc::new(html::HtmlPageExporter::default()))?;
    registry.register_exporter(Arc::new(json_api::JsonApiExporter::default()))?;
    registry.register_exporter(Arc::new(darwin_core::DarwinCoreArchiveExporter::default()))?;
    Ok(())
}
