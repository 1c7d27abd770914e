//! Enrichment loader invocation (§4.4, §5, §7).
//!
//! A reference's `enrichment` config names a `Loader` plugin that populates
//! extra columns from a secondary source after the entity's primary rows are
//! materialized. Retryable failures get exponential backoff up to a fixed
//! cap; anything left over is a warning on the entity, not a fatal import
//! error (§7: "non-retryable errors are surfaced as warnings").

use std::time::Duration;

use niamoto_core::config::EnrichmentSpec;
use niamoto_plugins::{LoaderContext, PluginRegistry};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Runs the enrichment loader declared for `entity`. Never fails the import:
/// any problem (unknown plugin, bad params, exhausted retries, non-retryable
/// error) is returned as a warning string and zero rows updated.
pub async fn run(plugins: &PluginRegistry, ctx: &dyn LoaderContext, entity: &str, spec: &EnrichmentSpec) -> (u64, Vec<String>) {
    let Some(loader) = plugins.loader(&spec.plugin) else {
        return (0, vec![format!("unknown loader plugin `{}`", spec.plugin)]);
    };

    let params = match loader.param_schema().validate(&spec.plugin, &spec.params) {
        Ok(params) => params,
        Err(e) => return (0, vec![e.to_string()]),
    };

    let mut attempt = 0;
    loop {
        match loader.load(entity, &params, ctx).await {
            Ok(outcome) => return (outcome.rows_updated, outcome.warnings),
            Err(e) if e.retryable && attempt < MAX_RETRIES => {
                attempt += 1;
                tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt - 1)).await;
            }
            Err(e) => return (0, vec![e.to_string()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use niamoto_core::error::LoaderError;
    use niamoto_plugins::{LoaderOutcome, ParamField, ParamSchema, ParamType, ParamValues};

    struct FailThenSucceed {
        calls: AtomicU32,
    }

    #[async_trait]
    impl niamoto_plugins::Loader for FailThenSucceed {
        fn id(&self) -> &str {
            "fail_then_succeed"
        }

        fn param_schema(&self) -> ParamSchema {
            ParamSchema::new(vec![ParamField::optional("source", ParamType::String, json!("api"))])
        }

        async fn load(&self, _entity_ref: &str, _params: &ParamValues, _ctx: &dyn LoaderContext) -> Result<LoaderOutcome, LoaderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(LoaderError { message: "timed out".into(), retryable: true, context: Default::default() })
            } else {
                Ok(LoaderOutcome { rows_updated: 5, warnings: Vec::new() })
            }
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl niamoto_plugins::Loader for AlwaysFatal {
        fn id(&self) -> &str {
            "always_fatal"
        }

        fn param_schema(&self) -> ParamSchema {
            ParamSchema::new(vec![])
        }

        async fn load(&self, _entity_ref: &str, _params: &ParamValues, _ctx: &dyn LoaderContext) -> Result<LoaderOutcome, LoaderError> {
            Err(LoaderError { message: "malformed source".into(), retryable: false, context: Default::default() })
        }
    }

    struct NoopContext;

    #[async_trait]
    impl LoaderContext for NoopContext {
        async fn write_columns(&self, _entity: &str, _updates: Vec<(Value, HashMap<String, Value>)>) -> Result<u64, LoaderError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn retries_a_retryable_failure_until_it_succeeds() {
        let registry = PluginRegistry::new();
        registry.register_loader(Arc::new(FailThenSucceed { calls: AtomicU32::new(0) })).unwrap();
        let spec = EnrichmentSpec { plugin: "fail_then_succeed".into(), params: HashMap::new() };

        let (rows_updated, warnings) = run(&registry, &NoopContext, "species", &spec).await;
        assert_eq!(rows_updated, 5);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn non_retryable_failure_becomes_a_warning_not_a_fatal_error() {
        let registry = PluginRegistry::new();
        registry.register_loader(Arc::new(AlwaysFatal)).unwrap();
        let spec = EnrichmentSpec { plugin: "always_fatal".into(), params: HashMap::new() };

        let (rows_updated, warnings) = run(&registry, &NoopContext, "species", &spec).await;
        assert_eq!(rows_updated, 0);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn unknown_loader_plugin_is_a_warning() {
        let registry = PluginRegistry::new();
        let spec = EnrichmentSpec { plugin: "nonexistent".into(), params: HashMap::new() };

        let (rows_updated, warnings) = run(&registry, &NoopContext, "species", &spec).await;
        assert_eq!(rows_updated, 0);
        assert_eq!(warnings.len(), 1);
    }
}
