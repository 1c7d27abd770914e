//! Import Engine (C4): drives the three strictly ordered phases — datasets,
//! derived references, direct references — materializing each entity's rows
//! under a transaction and registering it with the Entity Registry (§4.4).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use niamoto_core::config::{ConnectorSpec, ImportConfig, ReferenceKind, ReferenceSpec, SchemaSpec};
use niamoto_core::entity::{Entity, EntityKind, EntityLink, EntityMetadata, FieldDef, SemanticType};
use niamoto_core::error::{ErrorContext, IngestError, NiamotoError};
use niamoto_plugins::PluginRegistry;
use niamoto_registry::EntityRegistry;
use niamoto_store::{AnalyticalStore, Row};

use crate::connectors::{derived, file, file_multi_feature};
use crate::dag::DependencyGraph;
use crate::enrichment;
use crate::loader_context::StoreLoaderContext;

/// Per-entity outcome recorded by the import engine, surfaced to the CLI's
/// `stats` report and the run summary persisted under `_niamoto_meta.runs`.
#[derive(Debug, Clone)]
pub struct EntityImportResult {
    pub entity: String,
    pub row_count: u64,
    pub rejected: u64,
    pub warnings: Vec<String>,
}

pub struct ImportEngine {
    store: Arc<AnalyticalStore>,
    registry: Arc<EntityRegistry>,
    plugins: Arc<PluginRegistry>,
}

impl ImportEngine {
    pub fn new(store: Arc<AnalyticalStore>, registry: Arc<EntityRegistry>, plugins: Arc<PluginRegistry>) -> Self {
        Self { store, registry, plugins }
    }

    pub async fn run(&self, config: &ImportConfig) -> Result<Vec<EntityImportResult>, NiamotoError> {
        let mut results = Vec::new();

        let mut dataset_names: Vec<&String> = config.entities.datasets.keys().collect();
        dataset_names.sort();
        for name in dataset_names {
            let spec = &config.entities.datasets[name];
            let rows = self.load_dataset_rows(name, &spec.connector, &spec.schema).await?;
            let result = self
                .materialize_entity(
                    name,
                    EntityKind::Dataset,
                    rows.rows,
                    rows.rejected,
                    &spec.schema,
                    spec.links.iter().map(to_entity_link).collect(),
                    connector_kind(&spec.connector),
                    connector_descriptor(&spec.connector),
                    None,
                    None,
                )
                .await?;
            results.push(result);
        }

        let mut derived_graph = DependencyGraph::new();
        let mut derived_specs: Vec<(&String, &ReferenceSpec)> = Vec::new();
        let mut direct_specs: Vec<(&String, &ReferenceSpec)> = Vec::new();
        for (name, spec) in &config.entities.references {
            match &spec.connector {
                ConnectorSpec::Derived { source_entity } => {
                    derived_graph.add_dependency(name, source_entity);
                    derived_specs.push((name, spec));
                }
                _ => direct_specs.push((name, spec)),
            }
        }

        let derived_order = derived_graph.topological_order().map_err(NiamotoError::Config)?;
        for name in &derived_order {
            let Some((_, spec)) = derived_specs.iter().find(|(n, _)| *n == name) else { continue };
            let result = self.run_derived_reference(name, spec).await?;
            results.push(result);
        }

        direct_specs.sort_by_key(|(name, _)| (*name).clone());
        for (name, spec) in direct_specs {
            let result = self.run_direct_reference(name, spec).await?;
            results.push(result);
        }

        let mut errors = self.registry.validate_graph();
        errors.extend(self.registry.validate_link_values().await);
        if let Some(first) = errors.into_iter().next() {
            return Err(NiamotoError::Integrity(first));
        }

        Ok(results)
    }

    async fn load_dataset_rows(&self, name: &str, connector: &ConnectorSpec, schema: &SchemaSpec) -> Result<file::ProjectedRows, NiamotoError> {
        let scratch = format!("_scratch_{name}");
        match connector {
            ConnectorSpec::File { path } => {
                file::load(&self.store, &scratch, Path::new(path), schema).await.map_err(NiamotoError::Ingest)
            }
            ConnectorSpec::FileMultiFeature { sources } => {
                let rows = file_multi_feature::load(&self.store, &scratch, sources).await.map_err(NiamotoError::Ingest)?;
                Ok(file::ProjectedRows { rows, rejected: 0 })
            }
            ConnectorSpec::Derived { .. } => Err(NiamotoError::Ingest(IngestError {
                message: format!("dataset `{name}` cannot use a derived connector"),
                context: ErrorContext::entity(name),
            })),
        }
    }

    async fn run_derived_reference(&self, name: &str, spec: &ReferenceSpec) -> Result<EntityImportResult, NiamotoError> {
        let ConnectorSpec::Derived { source_entity } = &spec.connector else {
            unreachable!("run_derived_reference only called for Derived connectors")
        };

        let source_table = self.registry.resolve_table(source_entity).map_err(NiamotoError::Registry)?;
        let source_rows = self
            .store
            .execute(&format!("SELECT * FROM {source_table}"))
            .await
            .map_err(NiamotoError::Query)?;

        let (rows, levels) = match spec.kind {
            ReferenceKind::Hierarchical => {
                let hierarchy_spec = spec.hierarchy.as_ref().ok_or_else(|| {
                    NiamotoError::Config(niamoto_core::error::ConfigError {
                        message: format!("reference `{name}` is hierarchical but declares no hierarchy levels"),
                        context: ErrorContext::entity(name),
                    })
                })?;
                let rows = derived::materialize_hierarchical(&source_rows, hierarchy_spec).map_err(NiamotoError::Ingest)?;
                (rows, Some(hierarchy_spec.levels.clone()))
            }
            ReferenceKind::Flat | ReferenceKind::Spatial => {
                (derived::materialize_flat(&source_rows, &spec.schema), None)
            }
        };

        let kind = reference_entity_kind(spec.kind);
        let mut result = self
            .materialize_entity(
                name,
                kind,
                rows,
                0,
                &spec.schema,
                Vec::new(),
                "derived",
                source_entity,
                levels,
                None,
            )
            .await?;
        self.run_enrichment(name, spec, &mut result).await;
        Ok(result)
    }

    async fn run_direct_reference(&self, name: &str, spec: &ReferenceSpec) -> Result<EntityImportResult, NiamotoError> {
        let scratch = format!("_scratch_{name}");
        let (rows, crs) = match &spec.connector {
            ConnectorSpec::File { path } => {
                let projected = file::load(&self.store, &scratch, Path::new(path), &spec.schema).await.map_err(NiamotoError::Ingest)?;
                (projected.rows, declared_crs(&spec.schema))
            }
            ConnectorSpec::FileMultiFeature { sources } => {
                let rows = file_multi_feature::load(&self.store, &scratch, sources).await.map_err(NiamotoError::Ingest)?;
                (rows, declared_crs(&spec.schema))
            }
            ConnectorSpec::Derived { .. } => unreachable!("direct references never carry a derived connector"),
        };

        let kind = reference_entity_kind(spec.kind);
        let mut result = self
            .materialize_entity(name, kind, rows, 0, &spec.schema, Vec::new(), connector_kind(&spec.connector), connector_descriptor(&spec.connector), None, crs)
            .await?;
        self.run_enrichment(name, spec, &mut result).await;
        Ok(result)
    }

    /// Invokes the reference's declared enrichment loader, if any, merging
    /// warnings onto `result`. Never turns into a fatal import error (§7).
    async fn run_enrichment(&self, name: &str, spec: &ReferenceSpec, result: &mut EntityImportResult) {
        let Some(enrichment_spec) = &spec.enrichment else { return };
        let ctx = StoreLoaderContext::new(Arc::clone(&self.store), Arc::clone(&self.registry));
        let (rows_updated, warnings) = enrichment::run(&self.plugins, &ctx, name, enrichment_spec).await;
        tracing::info!(entity = name, rows_updated, "applied enrichment loader");
        result.warnings.extend(warnings);
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_entity(
        &self,
        name: &str,
        kind: EntityKind,
        rows: Vec<Row>,
        rejected: u64,
        schema: &SchemaSpec,
        links: Vec<EntityLink>,
        connector_kind: &str,
        source_descriptor: &str,
        levels: Option<Vec<String>>,
        crs: Option<String>,
    ) -> Result<EntityImportResult, NiamotoError> {
        let physical_table = self.registry.get(name).map(|e| e.physical_table).unwrap_or_else(|| Entity::physical_table_for(name));
        let row_count = rows.len() as u64;
        let checksum = checksum_rows(&rows);
        let arrow_schema = niamoto_store::infer_schema(&rows).map_err(NiamotoError::Ingest)?;

        let mut txn = self.store.begin_transaction();
        txn.stage_rows(&physical_table, &rows, arrow_schema).map_err(NiamotoError::Ingest)?;
        txn.commit().await.map_err(NiamotoError::Ingest)?;

        let fields = schema_fields(schema, kind);
        let entity = Entity {
            name: name.to_string(),
            kind,
            physical_table,
            schema: fields,
            id_field: schema.id_field.clone(),
            links,
            metadata: EntityMetadata {
                connector_kind: connector_kind.to_string(),
                source_descriptor: source_descriptor.to_string(),
                created_at: Utc::now(),
                row_count,
                checksum,
                levels,
                crs,
            },
        };
        self.registry.register(entity).await.map_err(NiamotoError::Registry)?;

        Ok(EntityImportResult { entity: name.to_string(), row_count, rejected, warnings: Vec::new() })
    }
}

fn reference_entity_kind(kind: ReferenceKind) -> EntityKind {
    match kind {
        ReferenceKind::Flat => EntityKind::ReferenceFlat,
        ReferenceKind::Hierarchical => EntityKind::ReferenceHierarchical,
        ReferenceKind::Spatial => EntityKind::ReferenceSpatial,
    }
}

fn schema_fields(schema: &SchemaSpec, kind: EntityKind) -> Vec<FieldDef> {
    schema
        .fields
        .iter()
        .map(|f| {
            let semantic_type = if Some(f.target.as_str()) == schema.id_field.as_deref() {
                SemanticType::Id
            } else if kind == EntityKind::ReferenceHierarchical {
                SemanticType::HierarchyLevel
            } else if kind == EntityKind::ReferenceSpatial && f.r#type.as_deref() == Some("geometry") {
                SemanticType::Geometry
            } else {
                SemanticType::Attribute
            };
            FieldDef { source_column: f.source.clone(), target_column: f.target.clone(), semantic_type }
        })
        .collect()
}

fn declared_crs(schema: &SchemaSpec) -> Option<String> {
    schema
        .fields
        .iter()
        .find(|f| f.r#type.as_deref() == Some("geometry"))
        .map(|_| "EPSG:4326".to_string())
}

fn checksum_rows(rows: &[Row]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        if let Ok(bytes) = serde_json::to_vec(row) {
            hasher.update(&bytes);
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn connector_kind(connector: &ConnectorSpec) -> &'static str {
    match connector {
        ConnectorSpec::File { .. } => "file",
        ConnectorSpec::FileMultiFeature { .. } => "file_multi_feature",
        ConnectorSpec::Derived { .. } => "derived",
    }
}

fn connector_descriptor(connector: &ConnectorSpec) -> &str {
    match connector {
        ConnectorSpec::File { path } => path,
        ConnectorSpec::FileMultiFeature { sources } => sources.first().map(|s| s.path.as_str()).unwrap_or(""),
        ConnectorSpec::Derived { source_entity } => source_entity,
    }
}

fn to_entity_link(link: &niamoto_core::config::LinkSpec) -> EntityLink {
    EntityLink {
        peer_entity: link.peer_entity.clone(),
        local_field: link.local_field.clone(),
        peer_field: link.peer_field.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use niamoto_core::config::{DatasetSpec, HierarchySpec, IdStrategy, ImportEntities, IncompleteRowsPolicy, SchemaFieldSpec};

    fn write_occurrences_csv(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("occurrences.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "taxonref,family,genus,species").unwrap();
        writeln!(f, "42,Myrtaceae,Eucalyptus,grandis").unwrap();
        writeln!(f, "43,Myrtaceae,Eucalyptus,obliqua").unwrap();
        writeln!(f, "44,Pinaceae,Pinus,radiata").unwrap();
        path
    }

    fn field(name: &str) -> SchemaFieldSpec {
        SchemaFieldSpec { source: name.into(), target: name.into(), r#type: None }
    }

    #[tokio::test]
    async fn imports_dataset_then_derives_hierarchical_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let csv_path = write_occurrences_csv(tmp.path());
        let store = Arc::new(AnalyticalStore::open(tmp.path().join("store")).await.unwrap());
        let registry = Arc::new(EntityRegistry::new(Arc::clone(&store)));
        let plugins = Arc::new(niamoto_plugins::PluginRegistry::new());
        let engine = ImportEngine::new(Arc::clone(&store), Arc::clone(&registry), plugins);

        let mut datasets = HashMap::new();
        datasets.insert(
            "occurrences".to_string(),
            DatasetSpec {
                connector: ConnectorSpec::File { path: csv_path.to_string_lossy().to_string() },
                schema: SchemaSpec {
                    id_field: Some("taxonref".into()),
                    fields: vec![field("taxonref"), field("family"), field("genus"), field("species")],
                },
                options: HashMap::new(),
                links: Vec::new(),
            },
        );

        let mut references = HashMap::new();
        references.insert(
            "taxonomy".to_string(),
            ReferenceSpec {
                kind: ReferenceKind::Hierarchical,
                connector: ConnectorSpec::Derived { source_entity: "occurrences".into() },
                schema: SchemaSpec { id_field: None, fields: Vec::new() },
                hierarchy: Some(HierarchySpec {
                    levels: vec!["family".into(), "genus".into(), "species".into()],
                    id_column: Some("taxonref".into()),
                    name_column: None,
                    incomplete_rows: IncompleteRowsPolicy::Skip,
                    id_strategy: IdStrategy::HashPath,
                }),
                enrichment: None,
            },
        );

        let config = ImportConfig { entities: ImportEntities { datasets, references } };
        let results = engine.run(&config).await.unwrap();

        let occurrences = results.iter().find(|r| r.entity == "occurrences").unwrap();
        assert_eq!(occurrences.row_count, 3);

        let taxonomy = results.iter().find(|r| r.entity == "taxonomy").unwrap();
        assert_eq!(taxonomy.row_count, 6);

        let entity = registry.get("taxonomy").unwrap();
        assert_eq!(entity.kind, EntityKind::ReferenceHierarchical);
        assert_eq!(
            entity.metadata.levels,
            Some(vec!["family".to_string(), "genus".to_string(), "species".to_string()])
        );
    }
}
