//! Plugin discovery (§4.3).
//!
//! Plugins register themselves by `(id, capability)` at process start. The
//! registry rejects duplicate ids within a capability; the same id may be
//! reused across different capabilities (a `mean` transformer and a `mean`
//! loader do not collide).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use niamoto_core::error::{ErrorContext, RegistryError};

use crate::traits::{Exporter, Loader, Transformer, Widget};

#[derive(Default)]
pub struct PluginRegistry {
    loaders: DashMap<String, Arc<dyn Loader>>,
    transformers: DashMap<String, Arc<dyn Transformer>>,
    exporters: DashMap<String, Arc<dyn Exporter>>,
    widgets: DashMap<String, Arc<dyn Widget>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_loader(&self, plugin: Arc<dyn Loader>) -> Result<(), RegistryError> {
        let id = plugin.id().to_string();
        if self.loaders.contains_key(&id) {
            return Err(duplicate("loader", &id));
        }
        info!(plugin = id, capability = "loader", "registered plugin");
        self.loaders.insert(id, plugin);
        Ok(())
    }

    pub fn register_transformer(&self, plugin: Arc<dyn Transformer>) -> Result<(), RegistryError> {
        let id = plugin.id().to_string();
        if self.transformers.contains_key(&id) {
            return Err(duplicate("transformer", &id));
        }
        info!(plugin = id, capability = "transformer", "registered plugin");
        self.transformers.insert(id, plugin);
        Ok(())
    }

    pub fn register_exporter(&self, plugin: Arc<dyn Exporter>) -> Result<(), RegistryError> {
        let id = plugin.id().to_string();
        if self.exporters.contains_key(&id) {
            return Err(duplicate("exporter", &id));
        }
        info!(plugin = id, capability = "exporter", "registered plugin");
        self.exporters.insert(id, plugin);
        Ok(())
    }

    pub fn register_widget(&self, plugin: Arc<dyn Widget>) -> Result<(), RegistryError> {
        let id = plugin.id().to_string();
        if self.widgets.contains_key(&id) {
            return Err(duplicate("widget", &id));
        }
        info!(plugin = id, capability = "widget", "registered plugin");
        self.widgets.insert(id, plugin);
        Ok(())
    }

    pub fn loader(&self, id: &str) -> Option<Arc<dyn Loader>> {
        self.loaders.get(id).map(|e| e.clone())
    }

    pub fn transformer(&self, id: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(id).map(|e| e.clone())
    }

    pub fn exporter(&self, id: &str) -> Option<Arc<dyn Exporter>> {
        self.exporters.get(id).map(|e| e.clone())
    }

    pub fn widget(&self, id: &str) -> Option<Arc<dyn Widget>> {
        self.widgets.get(id).map(|e| e.clone())
    }
}

fn duplicate(capability: &str, id: &str) -> RegistryError {
    RegistryError {
        message: format!("duplicate {capability} plugin id `{id}`"),
        context: ErrorContext::default().with_plugin(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::field_count::FieldCount;
    use crate::builtin::mean::Mean;

    #[test]
    fn duplicate_transformer_id_within_capability_is_rejected() {
        let registry = PluginRegistry::new();
        registry.register_transformer(Arc::new(FieldCount::default())).unwrap();
        let err = registry.register_transformer(Arc::new(FieldCount::default()));
        assert!(err.is_err());
    }

    #[test]
    fn distinct_ids_register_independently() {
        let registry = PluginRegistry::new();
        registry.register_transformer(Arc::new(FieldCount::default())).unwrap();
        registry.register_transformer(Arc::new(Mean::default())).unwrap();
        assert!(registry.transformer("field_count").is_some());
        assert!(registry.transformer("mean").is_some());
    }
}
