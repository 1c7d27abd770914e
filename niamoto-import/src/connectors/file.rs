//! `file` connector: a single delimited-text, Parquet, or vector file
//! ingested as a dataset (§4.4 point 1).
//!
//! Reads the source file via the store's own CSV/Parquet reader, then
//! projects `schema.fields` (source column -> target column rename) and
//! enforces required-field presence and `id_field` uniqueness/non-null,
//! matching §8 scenario 1's "missing taxonref rows rejected, count logged".

use std::path::Path;

use niamoto_core::config::SchemaSpec;
use niamoto_core::error::{ErrorContext, IngestError, SchemaError};
use niamoto_store::{AnalyticalStore, Row};

/// Outcome of projecting and validating a dataset's raw rows.
pub struct ProjectedRows {
    pub rows: Vec<Row>,
    pub rejected: u64,
}

/// Loads `path` into a scratch table, projects it through `schema`, and
/// returns the validated rows ready for registration under the entity's own
/// physical table name.
pub async fn load(store: &AnalyticalStore, scratch_table: &str, path: &Path, schema: &SchemaSpec) -> Result<ProjectedRows, IngestError> {
    store.register_table_file(scratch_table, path).await?;
    let raw_rows = store
        .execute(&format!("SELECT * FROM {scratch_table}"))
        .await
        .map_err(|e| IngestError { message: e.message, context: e.context })?;
    project(raw_rows, schema).map_err(|e| IngestError { message: e.message, context: e.context })
}

/// Projects raw rows through a schema: renames `source` columns to
/// `target` columns, drops rows missing a required field, and rejects
/// duplicate or null `id_field` values.
pub fn project(raw_rows: Vec<Row>, schema: &SchemaSpec) -> Result<ProjectedRows, SchemaError> {
    let mut rows = Vec::with_capacity(raw_rows.len());
    let mut rejected = 0u64;
    let mut seen_ids = std::collections::HashSet::new();

    'rows: for raw in raw_rows {
        let mut projected = Row::new();
        for field in &schema.fields {
            match raw.get(&field.source_column) {
                Some(value) if !value.is_null() => {
                    projected.insert(field.target_column.clone(), value.clone());
                }
                _ => {
                    // A missing value is only fatal to the row if the id
                    // field itself is what's missing; other missing fields
                    // are logged and carried through as null (§4.4: "missing
                    // optional schema field logged not fatal").
                    if schema.id_field.as_deref() == Some(field.target_column.as_str()) {
                        tracing::warn!(field = field.target_column, "row rejected: required id field missing");
                        rejected += 1;
                        continue 'rows;
                    }
                    tracing::debug!(field = field.target_column, "row missing optional field");
                }
            }
        }

        if let Some(id_field) = &schema.id_field {
            match projected.get(id_field) {
                Some(id_value) => {
                    let key = id_value.to_string();
                    if !seen_ids.insert(key) {
                        return Err(SchemaError {
                            message: format!("duplicate id_field value for field `{id_field}`"),
                            context: ErrorContext::default().with_field(id_field),
                        });
                    }
                }
                None => {
                    rejected += 1;
                    continue 'rows;
                }
            }
        }

        rows.push(projected);
    }

    Ok(ProjectedRows { rows, rejected })
}

/// Synthesizes a stable row id from a configured column projection when no
/// `id_field` is declared. Falls back to a random salt only when neither an
/// `id_field` nor a projection is configured, matching the §4.4 edge case.
pub fn synthesize_id(row: &Row, id_columns: &[String]) -> String {
    if id_columns.is_empty() {
        let salt: u64 = rand::random();
        return format!("row-{salt:016x}");
    }
    let joined: String = id_columns
        .iter()
        .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|");
    let hash = blake3::hash(joined.as_bytes());
    hash.to_hex().to_string()
}
