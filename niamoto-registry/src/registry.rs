//! Entity Registry (C2).
//!
//! The single source of truth for "what entities exist and how to query
//! them". Backed by tables under the store's reserved `_niamoto_meta`
//! schema, with a `DashMap` cache in front so `resolve_table` stays O(1)
//! after warmup instead of round-tripping through SQL on every call.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use dashmap::DashMap;
use serde_json::json;
use tracing::{info, warn};

use niamoto_core::entity::{Entity, EntityKind, SemanticType};
use niamoto_core::error::{ErrorContext, IntegrityError, RegistryError};
use niamoto_store::meta::{TABLE_ENTITIES, TABLE_ENTITY_FIELDS, TABLE_ENTITY_LINKS};
use niamoto_store::AnalyticalStore;

/// Filter accepted by [`EntityRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub kind: Option<EntityKind>,
    pub link_to: Option<String>,
}

fn entities_schema() -> arrow::datatypes::SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("physical_table", DataType::Utf8, false),
        Field::new("id_field", DataType::Utf8, true),
        Field::new("connector_kind", DataType::Utf8, false),
        Field::new("source_descriptor", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("row_count", DataType::Int64, false),
        Field::new("checksum", DataType::Utf8, false),
        Field::new("levels_json", DataType::Utf8, true),
        Field::new("crs", DataType::Utf8, true),
    ]))
}

fn entity_fields_schema() -> arrow::datatypes::SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("entity", DataType::Utf8, false),
        Field::new("source_column", DataType::Utf8, false),
        Field::new("target_column", DataType::Utf8, false),
        Field::new("semantic_type", DataType::Utf8, false),
    ]))
}

fn entity_links_schema() -> arrow::datatypes::SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("entity", DataType::Utf8, false),
        Field::new("peer_entity", DataType::Utf8, false),
        Field::new("local_field", DataType::Utf8, false),
        Field::new("peer_field", DataType::Utf8, false),
    ]))
}

fn kind_str(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Dataset => "dataset",
        EntityKind::ReferenceFlat => "reference_flat",
        EntityKind::ReferenceHierarchical => "reference_hierarchical",
        EntityKind::ReferenceSpatial => "reference_spatial",
    }
}

fn semantic_str(s: SemanticType) -> &'static str {
    match s {
        SemanticType::Id => "id",
        SemanticType::Name => "name",
        SemanticType::Geometry => "geometry",
        SemanticType::HierarchyLevel => "hierarchy_level",
        SemanticType::Link => "link",
        SemanticType::Attribute => "attribute",
    }
}

pub struct EntityRegistry {
    store: Arc<AnalyticalStore>,
    cache: DashMap<String, Entity>,
}

impl EntityRegistry {
    pub fn new(store: Arc<AnalyticalStore>) -> Self {
        Self { store, cache: DashMap::new() }
    }

    /// Loads every entity currently persisted under `_niamoto_meta.entities`
    /// into the in-memory cache. Call once at process start; the
    /// orchestrator also calls this at phase boundaries to take an
    /// immutable snapshot (§5: "loads the registry into an immutable
    /// snapshot at phase boundaries").
    pub async fn warm_up(&self) -> Result<(), RegistryError> {
        self.cache.clear();
        let rows = match self.store.execute(&format!("SELECT * FROM {TABLE_ENTITIES}")).await {
            Ok(rows) => rows,
            Err(_) => return Ok(()), // table not created yet: empty registry
        };
        for row in rows {
            let name = row["name"].as_str().unwrap_or_default().to_string();
            if let Ok(entity) = self.load_entity(&name).await {
                self.cache.insert(name, entity);
            }
        }
        Ok(())
    }

    async fn load_entity(&self, name: &str) -> Result<Entity, RegistryError> {
        let rows = self
            .store
            .execute(&format!("SELECT * FROM {TABLE_ENTITIES} WHERE name = '{name}'"))
            .await
            .map_err(|e| RegistryError { message: e.message, context: ErrorContext::entity(name) })?;
        let Some(row) = rows.into_iter().next() else {
            return Err(RegistryError {
                message: format!("entity `{name}` not found"),
                context: ErrorContext::entity(name),
            });
        };

        let field_rows = self
            .store
            .execute(&format!("SELECT * FROM {TABLE_ENTITY_FIELDS} WHERE entity = '{name}'"))
            .await
            .unwrap_or_default();
        let schema = field_rows
            .iter()
            .map(|f| niamoto_core::entity::FieldDef {
                source_column: f["source_column"].as_str().unwrap_or_default().to_string(),
                target_column: f["target_column"].as_str().unwrap_or_default().to_string(),
                semantic_type: parse_semantic(f["semantic_type"].as_str().unwrap_or_default()),
            })
            .collect();

        let link_rows = self
            .store
            .execute(&format!("SELECT * FROM {TABLE_ENTITY_LINKS} WHERE entity = '{name}'"))
            .await
            .unwrap_or_default();
        let links = link_rows
            .iter()
            .map(|l| niamoto_core::entity::EntityLink {
                peer_entity: l["peer_entity"].as_str().unwrap_or_default().to_string(),
                local_field: l["local_field"].as_str().unwrap_or_default().to_string(),
                peer_field: l["peer_field"].as_str().unwrap_or_default().to_string(),
            })
            .collect();

        let levels = row["levels_json"]
            .as_str()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok());

        Ok(Entity {
            name: name.to_string(),
            kind: parse_kind(row["kind"].as_str().unwrap_or_default())?,
            physical_table: row["physical_table"].as_str().unwrap_or_default().to_string(),
            schema,
            id_field: row["id_field"].as_str().map(|s| s.to_string()),
            links,
            metadata: niamoto_core::entity::EntityMetadata {
                connector_kind: row["connector_kind"].as_str().unwrap_or_default().to_string(),
                source_descriptor: row["source_descriptor"].as_str().unwrap_or_default().to_string(),
                created_at: row["created_at"]
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(chrono::Utc::now),
                row_count: row["row_count"].as_u64().unwrap_or(0),
                checksum: row["checksum"].as_str().unwrap_or_default().to_string(),
                levels,
                crs: row["crs"].as_str().map(|s| s.to_string()),
            },
        })
    }

    /// Upserts an entity. Recomputes `physical_table` only if name or kind
    /// changed; preserves `created_at` across re-registration. Fails with
    /// `RegistryError` only if a differently-kinded entity already holds
    /// the name (§4.2).
    pub async fn register(&self, mut entity: Entity) -> Result<Entity, RegistryError> {
        if let Some(existing) = self.cache.get(&entity.name) {
            if existing.kind != entity.kind {
                return Err(RegistryError {
                    message: format!(
                        "entity `{}` already registered as {:?}, cannot re-register as {:?}",
                        entity.name, existing.kind, entity.kind
                    ),
                    context: ErrorContext::entity(&entity.name),
                });
            }
            entity.metadata.created_at = existing.metadata.created_at;
            entity.physical_table = existing.physical_table.clone();
        } else {
            entity.physical_table = Entity::physical_table_for(&entity.name);
        }

        self.persist(&entity).await?;
        self.cache.insert(entity.name.clone(), entity.clone());
        info!(entity = entity.name, kind = ?entity.kind, "registered entity");
        Ok(entity)
    }

    async fn persist(&self, entity: &Entity) -> Result<(), RegistryError> {
        let row = json!({
            "name": entity.name,
            "kind": kind_str(entity.kind),
            "physical_table": entity.physical_table,
            "id_field": entity.id_field,
            "connector_kind": entity.metadata.connector_kind,
            "source_descriptor": entity.metadata.source_descriptor,
            "created_at": entity.metadata.created_at.to_rfc3339(),
            "row_count": entity.metadata.row_count,
            "checksum": entity.metadata.checksum,
            "levels_json": entity.metadata.levels.as_ref().map(|l| serde_json::to_string(l).unwrap()),
            "crs": entity.metadata.crs,
        });
        let row = row.as_object().cloned().unwrap();

        let mut all_entities = self.all_rows(TABLE_ENTITIES).await;
        all_entities.retain(|r| r["name"].as_str() != Some(entity.name.as_str()));
        all_entities.push(row);
        self.store
            .register_table_rows(TABLE_ENTITIES, all_entities, entities_schema())
            .await
            .map_err(|e| RegistryError { message: e.message, context: e.context })?;

        let field_rows: Vec<_> = entity
            .schema
            .iter()
            .map(|f| {
                json!({
                    "entity": entity.name,
                    "source_column": f.source_column,
                    "target_column": f.target_column,
                    "semantic_type": semantic_str(f.semantic_type),
                })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect();
        let mut all_fields = self.all_rows(TABLE_ENTITY_FIELDS).await;
        all_fields.retain(|r| r["entity"].as_str() != Some(entity.name.as_str()));
        all_fields.extend(field_rows);
        self.store
            .register_table_rows(TABLE_ENTITY_FIELDS, all_fields, entity_fields_schema())
            .await
            .map_err(|e| RegistryError { message: e.message, context: e.context })?;

        let link_rows: Vec<_> = entity
            .links
            .iter()
            .map(|l| {
                json!({
                    "entity": entity.name,
                    "peer_entity": l.peer_entity,
                    "local_field": l.local_field,
                    "peer_field": l.peer_field,
                })
                .as_object()
                .cloned()
                .unwrap()
            })
            .collect();
        let mut all_links = self.all_rows(TABLE_ENTITY_LINKS).await;
        all_links.retain(|r| r["entity"].as_str() != Some(entity.name.as_str()));
        all_links.extend(link_rows);
        self.store
            .register_table_rows(TABLE_ENTITY_LINKS, all_links, entity_links_schema())
            .await
            .map_err(|e| RegistryError { message: e.message, context: e.context })?;

        Ok(())
    }

    async fn all_rows(&self, table: &str) -> Vec<niamoto_store::Row> {
        self.store.execute(&format!("SELECT * FROM {table}")).await.unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<Entity> {
        self.cache.get(name).map(|e| e.clone())
    }

    pub fn list(&self, filter: EntityFilter) -> Vec<Entity> {
        self.cache
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| filter.kind.map(|k| k == e.kind).unwrap_or(true))
            .filter(|e| {
                filter
                    .link_to
                    .as_ref()
                    .map(|peer| e.links.iter().any(|l| &l.peer_entity == peer))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// O(1) after warmup: a direct cache lookup, no SQL round-trip.
    pub fn resolve_table(&self, name: &str) -> Result<String, RegistryError> {
        self.cache
            .get(name)
            .map(|e| e.physical_table.clone())
            .ok_or_else(|| RegistryError {
                message: format!("entity `{name}` not registered"),
                context: ErrorContext::entity(name),
            })
    }

    /// Checks links close over registered entities, hierarchical references
    /// declare non-empty levels, and spatial references declare a CRS.
    /// Cycle detection on `parent_id` is the import engine's responsibility
    /// at build time (it has the rows in hand); this pass validates the
    /// declarative shape of the registry itself.
    pub fn validate_graph(&self) -> Vec<IntegrityError> {
        let mut errors = Vec::new();
        let entities: Vec<Entity> = self.cache.iter().map(|e| e.value().clone()).collect();

        for entity in &entities {
            for link in &entity.links {
                match self.cache.get(&link.peer_entity) {
                    None => errors.push(IntegrityError {
                        message: format!(
                            "entity `{}` links to unregistered peer `{}`",
                            entity.name, link.peer_entity
                        ),
                        context: ErrorContext::entity(&entity.name).with_field(&link.local_field),
                    }),
                    Some(peer) => {
                        if peer.field(&link.peer_field).is_none() {
                            errors.push(IntegrityError {
                                message: format!(
                                    "entity `{}` links to field `{}` not present on peer `{}`",
                                    entity.name, link.peer_field, link.peer_entity
                                ),
                                context: ErrorContext::entity(&entity.name).with_field(&link.peer_field),
                            });
                        }
                    }
                }
            }

            if entity.kind == EntityKind::ReferenceHierarchical {
                let has_level_field = entity
                    .schema
                    .iter()
                    .any(|f| f.semantic_type == SemanticType::HierarchyLevel);
                let has_levels = entity
                    .metadata
                    .levels
                    .as_ref()
                    .map(|l| !l.is_empty())
                    .unwrap_or(false);
                if !has_level_field || !has_levels {
                    errors.push(IntegrityError {
                        message: format!(
                            "hierarchical reference `{}` must declare at least one hierarchy_level field and non-empty levels",
                            entity.name
                        ),
                        context: ErrorContext::entity(&entity.name),
                    });
                }
            }

            if entity.kind == EntityKind::ReferenceSpatial {
                let geometry_fields: Vec<_> = entity
                    .schema
                    .iter()
                    .filter(|f| f.semantic_type == SemanticType::Geometry)
                    .collect();
                if geometry_fields.len() != 1 {
                    errors.push(IntegrityError {
                        message: format!(
                            "spatial reference `{}` must declare exactly one geometry field, found {}",
                            entity.name,
                            geometry_fields.len()
                        ),
                        context: ErrorContext::entity(&entity.name),
                    });
                }
                if entity.metadata.crs.is_none() {
                    errors.push(IntegrityError {
                        message: format!("spatial reference `{}` must declare a CRS", entity.name),
                        context: ErrorContext::entity(&entity.name),
                    });
                }
            }
        }

        if !errors.is_empty() {
            warn!(count = errors.len(), "registry graph validation found integrity errors");
        }
        errors
    }

    /// Row-level counterpart to [`Self::validate_graph`]: for every declared
    /// link `A.f -> B.g`, every non-null value of `A.f` must exist in `B.g`
    /// (§8 testable property 3, scenario 4). `validate_graph` only checks the
    /// declarative shape (peer registered, field declared); this anti-joins
    /// the physical tables themselves and reports a capped, enumerated list
    /// of offending values per violated link.
    pub async fn validate_link_values(&self) -> Vec<IntegrityError> {
        const MAX_OFFENDING: usize = 20;

        let mut errors = Vec::new();
        let entities: Vec<Entity> = self.cache.iter().map(|e| e.value().clone()).collect();

        for entity in &entities {
            for link in &entity.links {
                let Some(peer_table) = self.cache.get(&link.peer_entity).map(|p| p.physical_table.clone()) else {
                    continue; // unregistered peer is already reported by validate_graph
                };

                let sql = format!(
                    "SELECT DISTINCT t.{local} AS offending_id FROM {table} t LEFT JOIN {peer_table} p \
                     ON t.{local} = p.{peer} WHERE t.{local} IS NOT NULL AND p.{peer} IS NULL",
                    local = link.local_field,
                    table = entity.physical_table,
                    peer = link.peer_field,
                );
                let rows = match self.store.execute(&sql).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(entity = entity.name, field = link.local_field, "failed to evaluate link value integrity: {e}");
                        continue;
                    }
                };
                if rows.is_empty() {
                    continue;
                }

                let mut offending: Vec<String> = rows.iter().filter_map(|r| r.get("offending_id")).map(|v| v.to_string()).collect();
                offending.sort();
                let total = offending.len();
                offending.truncate(MAX_OFFENDING);
                let more = if total > offending.len() { format!(", +{} more", total - offending.len()) } else { String::new() };

                errors.push(IntegrityError {
                    message: format!(
                        "entity `{}` field `{}` has {total} value(s) not present in `{}`.`{}`: [{}{more}]",
                        entity.name,
                        link.local_field,
                        link.peer_entity,
                        link.peer_field,
                        offending.join(", "),
                    ),
                    context: ErrorContext::entity(&entity.name).with_field(&link.local_field),
                });
            }
        }

        if !errors.is_empty() {
            warn!(count = errors.len(), "link value integrity check found orphaned references");
        }
        errors
    }
}

fn parse_kind(s: &str) -> Result<EntityKind, RegistryError> {
    match s {
        "dataset" => Ok(EntityKind::Dataset),
        "reference_flat" => Ok(EntityKind::ReferenceFlat),
        "reference_hierarchical" => Ok(EntityKind::ReferenceHierarchical),
        "reference_spatial" => Ok(EntityKind::ReferenceSpatial),
        other => Err(RegistryError {
            message: format!("unknown entity kind `{other}`"),
            context: ErrorContext::default(),
        }),
    }
}

fn parse_semantic(s: &str) -> SemanticType {
    match s {
        "id" => SemanticType::Id,
        "name" => SemanticType::Name,
        "geometry" => SemanticType::Geometry,
        "hierarchy_level" => SemanticType::HierarchyLevel,
        "link" => SemanticType::Link,
        _ => SemanticType::Attribute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use niamoto_core::entity::{EntityMetadata, FieldDef};

    fn flat_entity(name: &str) -> Entity {
        Entity {
            name: name.to_string(),
            kind: EntityKind::ReferenceFlat,
            physical_table: String::new(),
            schema: vec![FieldDef {
                source_column: "id".into(),
                target_column: "id".into(),
                semantic_type: SemanticType::Id,
            }],
            id_field: Some("id".into()),
            links: vec![],
            metadata: EntityMetadata {
                connector_kind: "file".into(),
                source_descriptor: "plots.csv".into(),
                created_at: chrono::Utc::now(),
                row_count: 0,
                checksum: "x".into(),
                levels: None,
                crs: None,
            },
        }
    }

    async fn registry_with_store() -> (EntityRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnalyticalStore::open(dir.path()).await.unwrap());
        (EntityRegistry::new(store), dir)
    }

    #[tokio::test]
    async fn register_then_resolve_table_is_direct_cache_hit() {
        let (registry, _dir) = registry_with_store().await;
        let entity = registry.register(flat_entity("plots")).await.unwrap();
        assert_eq!(registry.resolve_table("plots").unwrap(), entity.physical_table);
    }

    #[tokio::test]
    async fn re_registering_same_kind_preserves_created_at() {
        let (registry, _dir) = registry_with_store().await;
        let first = registry.register(flat_entity("plots")).await.unwrap();
        let second = registry.register(flat_entity("plots")).await.unwrap();
        assert_eq!(first.metadata.created_at, second.metadata.created_at);
    }

    #[tokio::test]
    async fn re_registering_with_different_kind_fails() {
        let (registry, _dir) = registry_with_store().await;
        registry.register(flat_entity("plots")).await.unwrap();
        let mut conflicting = flat_entity("plots");
        conflicting.kind = EntityKind::Dataset;
        assert!(registry.register(conflicting).await.is_err());
    }

    #[tokio::test]
    async fn validate_graph_flags_dangling_link() {
        let (registry, _dir) = registry_with_store().await;
        let mut occurrences = flat_entity("occurrences");
        occurrences.kind = EntityKind::Dataset;
        occurrences.links.push(niamoto_core::entity::EntityLink {
            peer_entity: "taxonomy".into(),
            local_field: "taxon_id".into(),
            peer_field: "id".into(),
        });
        registry.register(occurrences).await.unwrap();

        let errors = registry.validate_graph();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn validate_link_values_flags_orphaned_ids() {
        let (registry, _dir) = registry_with_store().await;

        let mut taxonomy = flat_entity("taxonomy");
        taxonomy.kind = EntityKind::ReferenceFlat;
        let taxonomy = registry.register(taxonomy).await.unwrap();
        let taxonomy_schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let taxonomy_rows = vec![
            json!({"id": 1i64}).as_object().cloned().unwrap(),
            json!({"id": 2i64}).as_object().cloned().unwrap(),
        ];
        registry.store.register_table_rows(&taxonomy.physical_table, taxonomy_rows, taxonomy_schema).await.unwrap();

        let mut occurrences = flat_entity("occurrences");
        occurrences.kind = EntityKind::Dataset;
        occurrences.links.push(niamoto_core::entity::EntityLink {
            peer_entity: "taxonomy".into(),
            local_field: "taxon_id".into(),
            peer_field: "id".into(),
        });
        let occurrences = registry.register(occurrences).await.unwrap();
        let occurrences_schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("taxon_id", DataType::Int64, true),
        ]));
        let occurrences_rows = vec![
            json!({"id": 1i64, "taxon_id": 1i64}).as_object().cloned().unwrap(),
            json!({"id": 2i64, "taxon_id": 9999i64}).as_object().cloned().unwrap(),
        ];
        registry
            .store
            .register_table_rows(&occurrences.physical_table, occurrences_rows, occurrences_schema)
            .await
            .unwrap();

        let errors = registry.validate_link_values().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("9999"), "message was: {}", errors[0].message);
    }

    #[tokio::test]
    async fn validate_link_values_passes_when_all_ids_resolve() {
        let (registry, _dir) = registry_with_store().await;

        let mut taxonomy = flat_entity("taxonomy");
        taxonomy.kind = EntityKind::ReferenceFlat;
        let taxonomy = registry.register(taxonomy).await.unwrap();
        let taxonomy_schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let taxonomy_rows = vec![json!({"id": 1i64}).as_object().cloned().unwrap()];
        registry.store.register_table_rows(&taxonomy.physical_table, taxonomy_rows, taxonomy_schema).await.unwrap();

        let mut occurrences = flat_entity("occurrences");
        occurrences.kind = EntityKind::Dataset;
        occurrences.links.push(niamoto_core::entity::EntityLink {
            peer_entity: "taxonomy".into(),
            local_field: "taxon_id".into(),
            peer_field: "id".into(),
        });
        let occurrences = registry.register(occurrences).await.unwrap();
        let occurrences_schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("taxon_id", DataType::Int64, true),
        ]));
        let occurrences_rows = vec![json!({"id": 1i64, "taxon_id": 1i64}).as_object().cloned().unwrap()];
        registry
            .store
            .register_table_rows(&occurrences.physical_table, occurrences_rows, occurrences_schema)
            .await
            .unwrap();

        assert!(registry.validate_link_values().await.is_empty());
    }

    #[tokio::test]
    async fn validate_graph_flags_spatial_reference_missing_crs() {
        let (registry, _dir) = registry_with_store().await;
        let mut shapes = flat_entity("shapes");
        shapes.kind = EntityKind::ReferenceSpatial;
        shapes.schema.push(FieldDef {
            source_column: "geom".into(),
            target_column: "geometry".into(),
            semantic_type: SemanticType::Geometry,
        });
        registry.register(shapes).await.unwrap();

        let errors = registry.validate_graph();
        assert!(errors.iter().any(|e| e.message.contains("CRS")));
    }
}
