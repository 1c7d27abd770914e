//! `derived` connector: a reference computed from another already-imported
//! entity's rows rather than read from an external file (§4.4 point 2).
//!
//! Hierarchical derived references go through [`hierarchy::materialize`].
//! Flat derived references collapse to a DISTINCT projection over the
//! schema's source columns, the non-hierarchical special case of the same
//! "distinct-projection over named columns" rule.

use std::collections::BTreeMap;

use niamoto_core::config::{HierarchySpec, SchemaSpec};
use niamoto_core::error::IngestError;
use niamoto_store::Row;

use crate::hierarchy::{self, HierarchyRow};

/// A derived flat reference's materialized rows, keyed for DISTINCT dedup.
pub fn materialize_flat(source_rows: &[Row], schema: &SchemaSpec) -> Vec<Row> {
    let mut seen: BTreeMap<String, Row> = BTreeMap::new();
    for raw in source_rows {
        let mut projected = Row::new();
        for field in &schema.fields {
            if let Some(value) = raw.get(&field.source) {
                projected.insert(field.target.clone(), value.clone());
            }
        }
        let key = serde_json::to_string(&projected).unwrap_or_default();
        seen.entry(key).or_insert(projected);
    }
    seen.into_values().collect()
}

/// A derived hierarchical reference's materialized rows, converted to the
/// plain [`Row`] shape the store persists.
pub fn materialize_hierarchical(source_rows: &[Row], hierarchy_spec: &HierarchySpec) -> Result<Vec<Row>, IngestError> {
    let levels = materialize_levels(source_rows, hierarchy_spec)?;
    Ok(levels.into_iter().map(hierarchy_row_to_store_row).collect())
}

fn materialize_levels(source_rows: &[Row], spec: &HierarchySpec) -> Result<Vec<HierarchyRow>, IngestError> {
    hierarchy::materialize(source_rows, &spec.levels, spec.id_column.as_deref(), spec.name_column.as_deref(), spec.incomplete_rows)
}

fn hierarchy_row_to_store_row(h: HierarchyRow) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), serde_json::json!(h.id));
    row.insert("parent_id".into(), h.parent_id.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null));
    row.insert("level".into(), serde_json::json!(h.level));
    row.insert("name".into(), serde_json::json!(h.name));
    row.insert("path".into(), serde_json::json!(h.path));
    row.insert("external_id".into(), h.external_id.unwrap_or(serde_json::Value::Null));
    row
}
