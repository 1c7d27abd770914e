//! Entity data model.
//!
//! An [`Entity`] is a named, typed logical object with a physical backing
//! table in the Analytical Store. This module only holds the data shapes;
//! the registry crate owns persistence and lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity, determining which invariants apply (see [`Entity`] docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dataset,
    ReferenceFlat,
    ReferenceHierarchical,
    ReferenceSpatial,
}

impl EntityKind {
    pub fn is_reference(&self) -> bool {
        !matches!(self, EntityKind::Dataset)
    }
}

/// Semantic role of a single column in an entity's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Id,
    Name,
    Geometry,
    HierarchyLevel,
    Link,
    Attribute,
}

/// One field in an entity's ordered schema, mapping a source column onto a
/// physical target column under a declared semantic role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub source_column: String,
    pub target_column: String,
    pub semantic_type: SemanticType,
}

/// A referential edge from this entity to a peer entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLink {
    pub peer_entity: String,
    pub local_field: String,
    pub peer_field: String,
}

/// Provenance and operational metadata recorded at import time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub connector_kind: String,
    pub source_descriptor: String,
    pub created_at: DateTime<Utc>,
    pub row_count: u64,
    pub checksum: String,

    /// Ordered hierarchy levels. Populated only for `reference_hierarchical`
    /// entities; part of metadata per the hierarchical invariant in §3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,

    /// Declared coordinate reference system. Populated only for
    /// `reference_spatial` entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

/// A named, typed logical object with a physical backing table.
///
/// Invariants enforced by the registry, not by this struct:
/// - `name` is unique across the registry (the stable external identifier).
/// - every `links[].peer_entity` resolves to a registered entity, and
///   `peer_field` exists in that peer's schema.
/// - `reference_hierarchical` entities carry >=1 `HierarchyLevel` field and a
///   non-empty `metadata.levels`.
/// - `reference_spatial` entities carry exactly one `Geometry` field and a
///   non-empty `metadata.crs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub physical_table: String,
    pub schema: Vec<FieldDef>,
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub links: Vec<EntityLink>,
    pub metadata: EntityMetadata,
}

impl Entity {
    pub fn field(&self, target_column: &str) -> Option<&FieldDef> {
        self.schema.iter().find(|f| f.target_column == target_column)
    }

    pub fn fields_of(&self, semantic_type: SemanticType) -> Vec<&FieldDef> {
        self.schema
            .iter()
            .filter(|f| f.semantic_type == semantic_type)
            .collect()
    }

    /// Derives the physical table name for a freshly registered entity.
    /// Mirrors the registry's rule: recomputed only on name/kind change,
    /// so this is only ever called at first registration or rename.
    pub fn physical_table_for(name: &str) -> String {
        format!("entity_{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity() -> Entity {
        Entity {
            name: "taxonomy".into(),
            kind: EntityKind::ReferenceHierarchical,
            physical_table: "entity_taxonomy".into(),
            schema: vec![
                FieldDef { source_column: "family".into(), target_column: "family".into(), semantic_type: SemanticType::HierarchyLevel },
                FieldDef { source_column: "id".into(), target_column: "id".into(), semantic_type: SemanticType::Id },
            ],
            id_field: Some("id".into()),
            links: vec![],
            metadata: EntityMetadata {
                connector_kind: "derived".into(),
                source_descriptor: "occurrences".into(),
                created_at: Utc::now(),
                row_count: 6,
                checksum: "deadbeef".into(),
                levels: Some(vec!["family".into(), "genus".into(), "species".into()]),
                crs: None,
            },
        }
    }

    #[test]
    fn field_lookup_by_target_column() {
        let e = sample_entity();
        assert!(e.field("family").is_some());
        assert!(e.field("missing").is_none());
    }

    #[test]
    fn fields_of_filters_by_semantic_type() {
        let e = sample_entity();
        assert_eq!(e.fields_of(SemanticType::HierarchyLevel).len(), 1);
        assert_eq!(e.fields_of(SemanticType::Id).len(), 1);
        assert_eq!(e.fields_of(SemanticType::Geometry).len(), 0);
    }

    #[test]
    fn physical_table_naming_is_deterministic() {
        assert_eq!(Entity::physical_table_for("taxonomy"), "entity_taxonomy");
        assert_eq!(Entity::physical_table_for("taxonomy"), Entity::physical_table_for("taxonomy"));
    }

    #[test]
    fn is_reference_distinguishes_dataset() {
        assert!(!EntityKind::Dataset.is_reference());
        assert!(EntityKind::ReferenceFlat.is_reference());
        assert!(EntityKind::ReferenceHierarchical.is_reference());
        assert!(EntityKind::ReferenceSpatial.is_reference());
    }
}
