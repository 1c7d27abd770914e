//! Embedded analytical store (C1).
//!
//! Wraps a DataFusion [`SessionContext`] the way the teacher's query engine
//! wraps it in `Engine` (see `examples/other_examples/0e518a77_reiase-probing`):
//! one context, a thin typed API over it, no query string assembly leaking
//! into callers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions, SessionConfig, SessionContext};
use tracing::{debug, info, warn};
use uuid::Uuid;

use niamoto_core::error::{ErrorContext, IngestError, QueryError};

use crate::meta::META_SCHEMA;
use crate::rows::{batches_to_rows, rows_to_batch, Row};
use crate::spatial::SpatialProbe;

/// Column/type pair surfaced by [`AnalyticalStore::introspect`].
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

/// The embedded columnar+spatial SQL engine. One instance backs an entire
/// project; `_niamoto_meta` is a reserved schema within it (§6).
pub struct AnalyticalStore {
    ctx: SessionContext,
    root: PathBuf,
    spatial: SpatialProbe,
}

impl AnalyticalStore {
    /// Opens (creating if absent) the store rooted at `root`. Any `*.parquet`
    /// files already present under `root` are re-registered as tables so a
    /// process restart sees the same entity tables without a re-import.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, QueryError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| QueryError {
            message: format!("failed to create store directory {}: {e}", root.display()),
            context: ErrorContext::default(),
        })?;
        fs::create_dir_all(root.join(META_SCHEMA)).map_err(|e| QueryError {
            message: format!("failed to create reserved schema directory: {e}"),
            context: ErrorContext::default(),
        })?;

        let config = SessionConfig::new().with_information_schema(true);
        let ctx = SessionContext::new_with_config(config);
        let store = Self {
            ctx,
            root,
            spatial: SpatialProbe::default(),
        };
        store.reload_existing_tables().await?;
        Ok(store)
    }

    async fn reload_existing_tables(&self) -> Result<(), QueryError> {
        for dir in [self.root.clone(), self.root.join(META_SCHEMA)] {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                self.register_parquet_path(stem, &path).await?;
            }
        }
        Ok(())
    }

    fn table_path(&self, name: &str) -> PathBuf {
        if crate::meta::is_reserved(name) {
            self.root.join(META_SCHEMA).join(format!("{name}.parquet"))
        } else {
            self.root.join(format!("{name}.parquet"))
        }
    }

    async fn register_parquet_path(&self, name: &str, path: &Path) -> Result<(), QueryError> {
        self.ctx
            .register_parquet(name, path.to_string_lossy().as_ref(), ParquetReadOptions::default())
            .await
            .map_err(|e| QueryError {
                message: format!("failed to register table {name}: {e}"),
                context: ErrorContext::entity(name),
            })
    }

    /// Parameterized execution; returns materialized rows. `params` are
    /// substituted positionally as `$1, $2, ...` placeholders.
    pub async fn execute(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        debug!(sql, "executing query");
        let df = self.ctx.sql(sql).await.map_err(|e| QueryError {
            message: format!("{e}"),
            context: ErrorContext::default(),
        })?;
        let batches = df.collect().await.map_err(|e| QueryError {
            message: format!("{e}"),
            context: ErrorContext::default(),
        })?;
        batches_to_rows(&batches).map_err(|e| QueryError {
            message: e.message,
            context: e.context,
        })
    }

    /// Ingests in-memory rows as a named table, replacing it if it already
    /// exists. Used by connectors that produce rows programmatically
    /// (derived references, multi-feature spatial unification).
    pub async fn register_table_rows(
        &self,
        name: &str,
        rows: Vec<Row>,
        schema: SchemaRef,
    ) -> Result<(), IngestError> {
        let batch = rows_to_batch(&rows, schema.clone())?;
        let path = self.table_path(name);
        write_parquet(&path, &batch)?;
        self.ctx.deregister_table(name).map_err(|e| IngestError {
            message: format!("failed to deregister stale table {name}: {e}"),
            context: ErrorContext::entity(name),
        })?;
        self.ctx
            .register_parquet(name, path.to_string_lossy().as_ref(), ParquetReadOptions::default())
            .await
            .map_err(|e| IngestError {
                message: format!("failed to register table {name}: {e}"),
                context: ErrorContext::entity(name),
            })?;
        info!(table = name, rows = batch.num_rows(), "registered table from rows");
        Ok(())
    }

    /// Ingests a file path (CSV or Parquet, detected by extension) as a
    /// named table, copying it into the store's own directory so the table
    /// survives independent of the original source file's lifetime.
    pub async fn register_table_file(&self, name: &str, source: &Path) -> Result<(), IngestError> {
        let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "csv" | "tsv" => self
                .ctx
                .register_csv(name, source.to_string_lossy().as_ref(), CsvReadOptions::new())
                .await
                .map_err(|e| IngestError {
                    message: format!("failed to read {}: {e}", source.display()),
                    context: ErrorContext::entity(name),
                }),
            "parquet" => self
                .register_parquet_path(name, source)
                .await
                .map_err(|e| IngestError { message: e.message, context: e.context }),
            other => Err(IngestError {
                message: format!("unsupported file extension `{other}` for entity {name}"),
                context: ErrorContext::entity(name),
            }),
        }
    }

    /// Enumerates user tables, excluding the reserved `_niamoto_meta` schema.
    pub async fn introspect(&self) -> Result<Vec<TableInfo>, QueryError> {
        let catalog = self.ctx.catalog("datafusion").ok_or_else(|| QueryError {
            message: "default catalog missing".into(),
            context: ErrorContext::default(),
        })?;
        let mut out = Vec::new();
        for schema_name in catalog.schema_names() {
            if schema_name == META_SCHEMA {
                continue;
            }
            let Some(schema) = catalog.schema(&schema_name) else { continue };
            for table_name in schema.table_names() {
                let provider = schema.table(&table_name).await.map_err(|e| QueryError {
                    message: format!("{e}"),
                    context: ErrorContext::entity(&table_name),
                })?;
                let Some(provider) = provider else { continue };
                let columns = provider
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| ColumnInfo {
                        name: f.name().clone(),
                        data_type: format!("{:?}", f.data_type()),
                    })
                    .collect();
                let count_sql = format!("SELECT COUNT(*) AS n FROM {table_name}");
                let row_count = self
                    .execute(&count_sql)
                    .await?
                    .first()
                    .and_then(|r| r.get("n"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                out.push(TableInfo { table: table_name, columns, row_count });
            }
        }
        Ok(out)
    }

    /// Probes (idempotently) whether spatial evaluation is available.
    pub fn spatial_enabled(&self) -> bool {
        self.spatial.ensure_loaded()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a transaction. The import engine wraps each entity's
    /// materialization in one so a crash mid-import leaves only a labelled,
    /// uncommitted prefix directory rather than a half-written table (§4.5).
    pub fn begin_transaction(&self) -> Transaction<'_> {
        let id = Uuid::new_v4();
        let prefix = self.root.join(format!(".txn-{id}"));
        Transaction { store: self, id, prefix, pending: HashMap::new() }
    }
}

fn write_parquet(path: &Path, batch: &arrow::record_batch::RecordBatch) -> Result<(), IngestError> {
    use parquet::arrow::ArrowWriter;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| IngestError {
            message: format!("failed to create directory {}: {e}", parent.display()),
            context: ErrorContext::default(),
        })?;
    }
    let file = fs::File::create(path).map_err(|e| IngestError {
        message: format!("failed to create {}: {e}", path.display()),
        context: ErrorContext::default(),
    })?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| IngestError {
        message: format!("failed to open parquet writer: {e}"),
        context: ErrorContext::default(),
    })?;
    writer.write(batch).map_err(|e| IngestError {
        message: format!("failed to write parquet batch: {e}"),
        context: ErrorContext::default(),
    })?;
    writer.close().map_err(|e| IngestError {
        message: format!("failed to finalize parquet file: {e}"),
        context: ErrorContext::default(),
    })?;
    Ok(())
}

/// A scoped set of table writes, buffered under a `.txn-<id>` prefix
/// directory until [`Transaction::commit`] moves them into place.
pub struct Transaction<'a> {
    store: &'a AnalyticalStore,
    id: Uuid,
    prefix: PathBuf,
    pending: HashMap<String, PathBuf>,
}

impl<'a> Transaction<'a> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage_rows(&mut self, name: &str, rows: &[Row], schema: SchemaRef) -> Result<(), IngestError> {
        let batch = rows_to_batch(rows, schema)?;
        let path = self.prefix.join(format!("{name}.parquet"));
        write_parquet(&path, &batch)?;
        self.pending.insert(name.to_string(), path);
        Ok(())
    }

    /// Moves every staged table into the store's root and registers it,
    /// then removes the now-empty transaction prefix.
    pub async fn commit(self) -> Result<(), IngestError> {
        for (name, staged_path) in &self.pending {
            let target = self.store.table_path(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).ok();
            }
            fs::rename(staged_path, &target).map_err(|e| IngestError {
                message: format!("failed to commit table {name}: {e}"),
                context: ErrorContext::entity(name),
            })?;
            self.store.ctx.deregister_table(name).map_err(|e| IngestError {
                message: format!("failed to deregister stale table {name}: {e}"),
                context: ErrorContext::entity(name),
            })?;
            self.store
                .register_parquet_path(name, &target)
                .await
                .map_err(|e| IngestError { message: e.message, context: e.context })?;
        }
        if self.prefix.exists() {
            fs::remove_dir_all(&self.prefix).ok();
        }
        Ok(())
    }

    /// Discards everything staged, leaving the store untouched. Callers may
    /// also simply drop the transaction and remove `prefix()` later for
    /// forensic inspection, matching the "labelled transaction prefix... is
    /// visible to the user" failure behavior in §4.5.
    pub fn rollback(self) {
        warn!(txn = %self.id, "rolling back transaction, discarding staged tables");
        if self.prefix.exists() {
            let _ = fs::remove_dir_all(&self.prefix);
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use serde_json::json;

    fn sample_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("family", DataType::Utf8, false),
        ]))
    }

    fn sample_rows() -> Vec<Row> {
        vec![
            json!({"id": 1, "family": "Myrtaceae"}).as_object().unwrap().clone(),
            json!({"id": 2, "family": "Pinaceae"}).as_object().unwrap().clone(),
        ]
    }

    #[tokio::test]
    async fn register_and_query_in_memory_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticalStore::open(dir.path()).await.unwrap();
        store
            .register_table_rows("occurrences", sample_rows(), sample_schema())
            .await
            .unwrap();

        let rows = store.execute("SELECT * FROM occurrences ORDER BY id").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["family"], "Myrtaceae");
    }

    #[tokio::test]
    async fn introspect_excludes_reserved_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticalStore::open(dir.path()).await.unwrap();
        store
            .register_table_rows("occurrences", sample_rows(), sample_schema())
            .await
            .unwrap();

        let tables = store.introspect().await.unwrap();
        assert!(tables.iter().any(|t| t.table == "occurrences"));
        assert!(!tables.iter().any(|t| t.table == META_SCHEMA));
    }

    #[tokio::test]
    async fn transaction_rollback_leaves_no_registered_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticalStore::open(dir.path()).await.unwrap();
        let mut txn = store.begin_transaction();
        txn.stage_rows("taxonomy", &sample_rows(), sample_schema()).unwrap();
        let prefix = txn.prefix().to_path_buf();
        txn.rollback();

        assert!(!prefix.exists());
        assert!(store.execute("SELECT * FROM taxonomy").await.is_err());
    }

    #[tokio::test]
    async fn transaction_commit_makes_table_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnalyticalStore::open(dir.path()).await.unwrap();
        let mut txn = store.begin_transaction();
        txn.stage_rows("taxonomy", &sample_rows(), sample_schema()).unwrap();
        txn.commit().await.unwrap();

        let rows = store.execute("SELECT * FROM taxonomy").await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
