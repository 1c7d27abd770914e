//! Derived hierarchical reference materialization (§4.4 phase 2).
//!
//! A single declarative plan: distinct-projection over level columns,
//! forward construction of hierarchical paths (`L1|L2|...|Lk`), hash-based
//! id assignment stable across runs, parent id resolution by prefix lookup.
//! Implemented as an adjacency list (`parent_id` column) rather than a
//! nested-set representation (§9).

use std::collections::BTreeMap;

use niamoto_core::config::IncompleteRowsPolicy;
use niamoto_core::error::{ErrorContext, IngestError};
use niamoto_store::Row;

const PATH_SEPARATOR: &str = "|";

/// One row of the materialized hierarchy table.
#[derive(Debug, Clone)]
pub struct HierarchyRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub level: String,
    pub name: String,
    pub path: String,
    pub external_id: Option<serde_json::Value>,
}

/// Stable id for a path: the first 64 bits of its blake3 hash, matching
/// §4.4's `id = first-64-bits(blake/sha of path)`.
pub fn hash_path(path: &str) -> i64 {
    let hash = blake3::hash(path.as_bytes());
    let bytes: [u8; 8] = hash.as_bytes()[0..8].try_into().expect("blake3 digest is >= 8 bytes");
    u64::from_be_bytes(bytes) as i64
}

/// Builds the full adjacency-list hierarchy from a dataset's rows.
pub fn materialize(
    source_rows: &[Row],
    levels: &[String],
    id_column: Option<&str>,
    name_column: Option<&str>,
    policy: IncompleteRowsPolicy,
) -> Result<Vec<HierarchyRow>, IngestError> {
    // Keyed by path so duplicate rows collapse by DISTINCT on path (§4.4).
    let mut by_path: BTreeMap<String, HierarchyRow> = BTreeMap::new();

    for (row_index, row) in source_rows.iter().enumerate() {
        let mut segments: Vec<String> = Vec::with_capacity(levels.len());
        let mut incomplete = false;

        for level in levels {
            match row.get(level).and_then(value_as_segment) {
                Some(segment) => segments.push(segment),
                None => {
                    incomplete = true;
                    match policy {
                        IncompleteRowsPolicy::Skip => break,
                        IncompleteRowsPolicy::FillUnknown => {
                            tracing::warn!(row = row_index, level, "substituting sentinel for missing ancestor");
                            segments.push(format!("unknown:{level}"));
                        }
                        IncompleteRowsPolicy::Error => {
                            return Err(IngestError {
                                message: format!(
                                    "row {row_index} is missing ancestor level `{level}` and incomplete_rows=error"
                                ),
                                context: ErrorContext::entity("derived").with_field(level),
                            });
                        }
                    }
                }
            }
        }

        if incomplete && matches!(policy, IncompleteRowsPolicy::Skip) && segments.len() < levels.len() {
            continue;
        }

        let mut path = String::new();
        for (depth, segment) in segments.iter().enumerate() {
            let parent_path = if path.is_empty() { None } else { Some(path.clone()) };
            if !path.is_empty() {
                path.push_str(PATH_SEPARATOR);
            }
            path.push_str(segment);

            let is_leaf = depth + 1 == levels.len();
            let external_id = if is_leaf { id_column.and_then(|c| row.get(c).cloned()) } else { None };
            let name = if is_leaf {
                name_column
                    .and_then(|c| row.get(c).and_then(value_as_segment))
                    .unwrap_or_else(|| segment.clone())
            } else {
                segment.clone()
            };

            by_path.entry(path.clone()).or_insert_with(|| HierarchyRow {
                id: hash_path(&path),
                parent_id: parent_path.as_deref().map(hash_path),
                level: levels[depth].clone(),
                name,
                path: path.clone(),
                external_id,
            });
        }
    }

    Ok(by_path.into_values().collect())
}

fn value_as_segment(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
