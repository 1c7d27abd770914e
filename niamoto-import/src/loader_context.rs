//! Concrete `LoaderContext` backing enrichment loaders with the analytical
//! store, keeping the plugin crate itself decoupled from storage types
//! (§9 DESIGN NOTES, dependency injection over global singletons).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use niamoto_core::error::{ErrorContext, LoaderError};
use niamoto_plugins::LoaderContext;
use niamoto_registry::EntityRegistry;
use niamoto_store::AnalyticalStore;

pub struct StoreLoaderContext {
    store: Arc<AnalyticalStore>,
    registry: Arc<EntityRegistry>,
}

impl StoreLoaderContext {
    pub fn new(store: Arc<AnalyticalStore>, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }
}

#[async_trait]
impl LoaderContext for StoreLoaderContext {
    /// Merges `updates` (keyed by the entity's declared `id_field` value)
    /// onto the entity's already-materialized rows and re-commits the
    /// table in one transaction.
    async fn write_columns(&self, entity: &str, updates: Vec<(Value, HashMap<String, Value>)>) -> Result<u64, LoaderError> {
        let record = self.registry.get(entity).ok_or_else(|| LoaderError {
            message: format!("entity `{entity}` is not registered"),
            retryable: false,
            context: ErrorContext::entity(entity),
        })?;
        let id_field = record.id_field.clone().ok_or_else(|| LoaderError {
            message: format!("entity `{entity}` declares no id_field; loaders cannot target rows"),
            retryable: false,
            context: ErrorContext::entity(entity),
        })?;

        let mut rows = self
            .store
            .execute(&format!("SELECT * FROM {}", record.physical_table))
            .await
            .map_err(|e| LoaderError { message: e.message, retryable: true, context: e.context })?;

        let mut updated = 0u64;
        for (id_value, columns) in updates {
            if let Some(row) = rows.iter_mut().find(|r| r.get(&id_field) == Some(&id_value)) {
                for (column, value) in columns {
                    row.insert(column, value);
                }
                updated += 1;
            }
        }

        let schema = niamoto_store::infer_schema(&rows).map_err(|e| LoaderError {
            message: e.message,
            retryable: false,
            context: e.context,
        })?;
        let mut txn = self.store.begin_transaction();
        txn.stage_rows(&record.physical_table, &rows, schema).map_err(|e| LoaderError {
            message: e.message,
            retryable: false,
            context: e.context,
        })?;
        txn.commit().await.map_err(|e| LoaderError {
            message: e.message,
            retryable: true,
            context: e.context,
        })?;

        Ok(updated)
    }
}
