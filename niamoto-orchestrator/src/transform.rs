//! Transform/Export Orchestrator (C5), transform half.
//!
//! `group_by` names a reference entity (§4.5), not a dataset column: for
//! every row of that reference, each declared source's dataset rows are
//! joined against it (by an explicit `relation.key` or by the dataset's own
//! declared link to the reference) to assemble the group's inputs, then each
//! group's declared widgets run and their payloads are stored. Pure
//! transformers run on a bounded worker pool (`tokio::task::spawn_blocking`
//! gated by a `Semaphore`, matching the teacher's own bounded-concurrency
//! pattern for CPU-bound work); impure ones and `chain` run inline on the
//! calling task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use niamoto_core::config::{TransformSection, TransformSource, WidgetSpec};
use niamoto_core::error::{ConfigError, ErrorContext, NiamotoError, TimeoutError};
use niamoto_core::payload::{PipelineRun, RunPhase, WidgetPayload};
use niamoto_plugins::builtin::chain::{run_chain, ChainStepSpec};
use niamoto_plugins::{Inputs, PluginRegistry, Row};
use niamoto_registry::EntityRegistry;
use niamoto_store::AnalyticalStore;

use crate::payload_store::PayloadStore;

/// Upper bound on concurrently executing pure-transformer tasks.
const WORKER_POOL_SIZE: usize = 8;

pub struct TransformOrchestrator {
    store: Arc<AnalyticalStore>,
    registry: Arc<EntityRegistry>,
    plugins: Arc<PluginRegistry>,
    payloads: Arc<PayloadStore>,
}

impl TransformOrchestrator {
    pub fn new(store: Arc<AnalyticalStore>, registry: Arc<EntityRegistry>, plugins: Arc<PluginRegistry>) -> Self {
        Self { store, registry, plugins, payloads: Arc::new(PayloadStore::new()) }
    }

    pub fn payload_store(&self) -> Arc<PayloadStore> {
        Arc::clone(&self.payloads)
    }

    /// Runs every declared transform section in order. `deadline` bounds the
    /// whole pass (§5's per-run timeout); `cancel` is polled between groups
    /// so a caller can stop a long-running transform early.
    pub async fn run(&self, sections: &[TransformSection], cancel: CancellationToken, deadline: Option<Instant>) -> Result<PipelineRun, NiamotoError> {
        let mut run = PipelineRun::start(RunPhase::Transform, 0);

        for section in sections {
            if cancel.is_cancelled() {
                return Ok(run.cancel());
            }
            if let Err(timeout) = self.run_section(section, &mut run, &cancel, deadline).await {
                run.record_error(None, None, timeout.message.clone());
                return Err(NiamotoError::Timeout(timeout));
            }
        }

        Ok(run.finish())
    }

    async fn run_section(
        &self,
        section: &TransformSection,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(), TimeoutError> {
        if section.sources.is_empty() {
            return Ok(());
        }

        // `group_by` names a reference entity (§4.5), not a column on any
        // source row: fetch its rows and, for each, assemble the per-group
        // input by joining every declared source's dataset rows against it
        // on the declared (or link-inferred) local field.
        let group_entity = self.registry.get(&section.group_by);
        let ref_id_field = group_entity.as_ref().and_then(|e| e.id_field.clone()).unwrap_or_else(|| "id".to_string());
        let reference_rows = self.load_source_rows(&section.group_by).await;

        let mut indexed_sources: HashMap<String, HashMap<String, Vec<Row>>> = HashMap::new();
        for source in &section.sources {
            let rows = self.load_source_rows(&source.data).await;
            let join_field = self.resolve_join_field(source, &section.group_by);
            let Some(join_field) = join_field else {
                tracing::warn!(
                    source = %source.name,
                    data = %source.data,
                    group_by = %section.group_by,
                    "transform source declares no relation and no link to its group_by entity; every group sees zero rows for it"
                );
                indexed_sources.insert(source.name.clone(), HashMap::new());
                continue;
            };
            let mut by_join_value: HashMap<String, Vec<Row>> = HashMap::new();
            for row in rows {
                if let Some(value) = row.get(&join_field) {
                    by_join_value.entry(join_key(value)).or_default().push(row);
                }
            }
            indexed_sources.insert(source.name.clone(), by_join_value);
        }

        // `groups` maps the human-readable, lexicographically sortable
        // group key (the hierarchy `path` when present, else `name`, else
        // the raw id) to the join value used to look up each source's rows.
        let mut groups: BTreeMap<String, String> = BTreeMap::new();
        for row in &reference_rows {
            let id_value = row.get(&ref_id_field).cloned().unwrap_or(serde_json::Value::Null);
            let display_key = row
                .get("path")
                .and_then(|v| v.as_str())
                .or_else(|| row.get("name").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .unwrap_or_else(|| value_to_group_key(&id_value));
            groups.insert(display_key, join_key(&id_value));
        }

        run.groups_total += groups.len() as u64;

        let mut widget_names: Vec<&String> = section.widgets.keys().collect();
        widget_names.sort();

        let semaphore = Arc::new(Semaphore::new(WORKER_POOL_SIZE));

        for (group_key, join_value) in groups {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(TimeoutError {
                        message: format!("transform pass exceeded its deadline at group `{group_key}`"),
                        context: ErrorContext::default().with_group(group_key.clone()),
                    });
                }
            }

            let mut inputs = Inputs::new();
            for source in &section.sources {
                let rows = indexed_sources
                    .get(&source.name)
                    .and_then(|by_join_value| by_join_value.get(&join_value))
                    .cloned()
                    .unwrap_or_default();
                inputs.insert(source.name.clone(), rows);
            }
            let inputs = Arc::new(inputs);

            let mut handles = Vec::new();
            for widget_name in &widget_names {
                let widget_spec = &section.widgets[*widget_name];
                if widget_spec.plugin == "chain" {
                    let outcome = self.run_chain_widget(widget_spec, &inputs, &group_key);
                    handles.push(((*widget_name).clone(), tokio::spawn(async move { outcome })));
                    continue;
                }

                let Some(transformer) = self.plugins.transformer(&widget_spec.plugin) else {
                    run.record_error(Some(group_key.clone()), Some(widget_spec.plugin.clone()), "unknown transformer plugin");
                    continue;
                };
                let params = match transformer.param_schema().validate(&widget_spec.plugin, &widget_spec.params) {
                    Ok(p) => p,
                    Err(e) => {
                        run.record_error(Some(group_key.clone()), Some(widget_spec.plugin.clone()), e.to_string());
                        continue;
                    }
                };

                let inputs = Arc::clone(&inputs);
                let group_key_owned = group_key.clone();
                let result = if transformer.is_pure() {
                    let semaphore = Arc::clone(&semaphore);
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.expect("transform worker pool semaphore closed");
                        let join = tokio::task::spawn_blocking(move || transformer.transform(&inputs, &params, &group_key_owned));
                        join.await.unwrap_or_else(|e| Err(panic_to_transform_error(e)))
                    })
                } else {
                    tokio::spawn(async move { transformer.transform(&inputs, &params, &group_key_owned) })
                };
                handles.push(((*widget_name).clone(), result));
            }

            for (widget_name, handle) in handles {
                match handle.await {
                    Ok(Ok(value)) => self
                        .payloads
                        .insert(&section.group_by, WidgetPayload::new(group_key.clone(), widget_name, value)),
                    Ok(Err(e)) => run.record_error(Some(group_key.clone()), Some(widget_name), e.to_string()),
                    Err(e) => run.record_error(Some(group_key.clone()), Some(widget_name), format!("widget task failed: {e}")),
                }
            }

            run.groups_processed += 1;
        }

        Ok(())
    }

    async fn load_source_rows(&self, entity: &str) -> Vec<Row> {
        let Ok(table) = self.registry.resolve_table(entity) else {
            tracing::warn!(entity, "transform source references an unregistered entity");
            return Vec::new();
        };
        self.store.execute(&format!("SELECT * FROM {table}")).await.unwrap_or_default()
    }

    /// Finds the local field on `source`'s dataset that joins it to the
    /// `group_by` reference entity's id: an explicit `relation.key` wins,
    /// otherwise the dataset's own declared `EntityLink` whose peer is
    /// `group_by` is used. Returns `None` when neither resolves, in which
    /// case the caller logs a warning and treats the source as empty.
    fn resolve_join_field(&self, source: &TransformSource, group_by: &str) -> Option<String> {
        if let Some(relation) = &source.relation {
            if let Some(key) = &relation.key {
                return Some(key.clone());
            }
        }
        let entity = self.registry.get(&source.data)?;
        entity.links.iter().find(|l| l.peer_entity == group_by).map(|l| l.local_field.clone())
    }

    fn run_chain_widget(&self, spec: &WidgetSpec, inputs: &Inputs, group_key: &str) -> Result<serde_json::Value, niamoto_core::error::TransformError> {
        let steps = parse_chain_steps(spec).map_err(|e| niamoto_core::error::TransformError {
            message: e.message,
            context: e.context,
        })?;
        run_chain(&self.plugins, &steps, inputs, group_key)
    }
}

fn parse_chain_steps(spec: &WidgetSpec) -> Result<Vec<ChainStepSpec>, ConfigError> {
    let raw = spec.params.get("steps").ok_or_else(|| ConfigError {
        message: "chain widget requires a `steps` parameter".into(),
        context: ErrorContext::default().with_plugin("chain"),
    })?;
    let entries = raw.as_array().ok_or_else(|| ConfigError {
        message: "chain widget's `steps` parameter must be an array".into(),
        context: ErrorContext::default().with_plugin("chain"),
    })?;

    entries
        .iter()
        .map(|entry| {
            let plugin = entry
                .get("plugin")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ConfigError {
                    message: "each chain step requires a `plugin` name".into(),
                    context: ErrorContext::default().with_plugin("chain"),
                })?
                .to_string();
            let params = entry
                .get("params")
                .and_then(|v| v.as_object())
                .map(|o| o.clone().into_iter().collect())
                .unwrap_or_default();
            Ok(ChainStepSpec { plugin, params })
        })
        .collect()
}

fn value_to_group_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Canonical join-comparison key: both sides of a join come back from the
/// same store's JSON rows, so a plain `to_string` of the `Value` is stable
/// and type-preserving (unlike [`value_to_group_key`], which is for display).
fn join_key(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn panic_to_transform_error(e: tokio::task::JoinError) -> niamoto_core::error::TransformError {
    niamoto_core::error::TransformError {
        message: format!("transformer task panicked: {e}"),
        context: ErrorContext::default(),
    }
}
