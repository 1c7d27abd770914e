//! Row representation exchanged across the store boundary.
//!
//! Plugins never see Arrow types directly (§4.3: "plugins receive
//! materialized row collections, not store handles"); they operate on plain
//! JSON objects. This module converts between the two.

use std::sync::Arc;

use arrow::json::writer::record_batches_to_json_rows;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};

use niamoto_core::error::{ErrorContext, IngestError};

pub type Row = Map<String, Value>;

/// Infers an Arrow schema from a sample of in-memory rows. Used for
/// connector output that has no declared schema of its own (derived
/// references, multi-feature unification) so it can still go through
/// [`rows_to_batch`] like any file-sourced table.
pub fn infer_schema(rows: &[Row]) -> Result<arrow::datatypes::SchemaRef, IngestError> {
    use arrow::json::reader::infer_json_schema_from_iterator;

    let schema = infer_json_schema_from_iterator(rows.iter().map(|r| Ok(Value::Object(r.clone()))))
        .map_err(|e| IngestError {
            message: format!("failed to infer schema from rows: {e}"),
            context: ErrorContext::default(),
        })?;
    Ok(Arc::new(schema))
}

pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, IngestError> {
    if batches.is_empty() {
        return Ok(Vec::new());
    }
    record_batches_to_json_rows(&batches.iter().collect::<Vec<_>>()).map_err(|e| IngestError {
        message: format!("failed to convert result batches to rows: {e}"),
        context: ErrorContext::default(),
    })
}

/// Builds record batches from JSON rows against a declared schema by
/// round-tripping through newline-delimited JSON and Arrow's JSON reader.
/// This lets in-memory connector output reuse the same ingest path as file
/// sources instead of hand-building Arrow arrays per Rust type.
pub fn rows_to_batch(
    rows: &[Row],
    schema: arrow::datatypes::SchemaRef,
) -> Result<RecordBatch, IngestError> {
    use std::io::Cursor;

    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row).map_err(|e| IngestError {
            message: format!("failed to encode row: {e}"),
            context: ErrorContext::default(),
        })?;
        buf.push(b'\n');
    }

    let cursor = Cursor::new(buf);
    let mut reader = arrow::json::ReaderBuilder::new(Arc::clone(&schema))
        .build(cursor)
        .map_err(|e| IngestError {
            message: format!("failed to build json reader: {e}"),
            context: ErrorContext::default(),
        })?;

    let mut batches = Vec::new();
    while let Some(batch) = reader.next() {
        batches.push(batch.map_err(|e| IngestError {
            message: format!("failed to decode rows: {e}"),
            context: ErrorContext::default(),
        })?);
    }

    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    arrow::compute::concat_batches(&schema, &batches).map_err(|e| IngestError {
        message: format!("failed to concatenate row batches: {e}"),
        context: ErrorContext::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn sample_schema() -> arrow::datatypes::SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    #[test]
    fn batches_to_rows_round_trips_simple_types() {
        let schema = sample_schema();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
            ],
        )
        .unwrap();

        let rows = batches_to_rows(&[batch]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::from(1));
        assert_eq!(rows[0]["name"], Value::from("a"));
    }

    #[test]
    fn rows_to_batch_reconstructs_schema() {
        let schema = sample_schema();
        let mut row = Row::new();
        row.insert("id".into(), Value::from(7));
        row.insert("name".into(), Value::from("eucalyptus"));

        let batch = rows_to_batch(&[row], schema.clone()).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema(), schema);
    }

    #[test]
    fn empty_batches_produce_no_rows() {
        assert!(batches_to_rows(&[]).unwrap().is_empty());
    }

    #[test]
    fn infer_schema_picks_up_field_types() {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(1));
        row.insert("name".into(), Value::from("eucalyptus"));

        let schema = infer_schema(&[row]).unwrap();
        assert!(schema.field_with_name("id").is_ok());
        assert!(schema.field_with_name("name").is_ok());
    }
}
