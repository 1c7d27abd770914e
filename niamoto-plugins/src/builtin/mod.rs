//! Built-in plugins shipped with the core.

pub mod chain;
pub mod field_count;
pub mod mean;
pub mod scale;
pub mod top_ranking;

use std::sync::Arc;

use crate::registry::PluginRegistry;
use niamoto_core::error::RegistryError;

/// Registers every built-in transformer. `chain` is not registered here: it
/// is driven directly by the orchestrator via [`chain::run_chain`] since it
/// needs to call back into the registry itself (see `chain`'s module docs).
pub fn register_builtins(registry: &PluginRegistry) -> Result<(), RegistryError> {
    registry.register_transformer(Arc::new(field_count::FieldCount::default()))?;
    registry.register_transformer(Arc::new(mean::Mean::default()))?;
    registry.register_transformer(Arc::new(scale::Scale::default()))?;
    registry.register_transformer(Arc::new(top_ranking::TopRanking::default()))?;
    Ok(())
}
