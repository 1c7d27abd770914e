//! `darwin_core_archive` exporter (§4.3, §6): a zip archive with a core CSV
//! (occurrences), optional extension CSVs (e.g. measurements), and an XML
//! descriptor (`meta.xml`), field-mapped per entity via configured params.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use niamoto_core::error::{ErrorContext, ExportError};
use niamoto_core::payload::WidgetPayload;
use niamoto_plugins::{ExportOutcome, ExportStyle, Exporter, ParamField, ParamSchema, ParamType, ParamValues};

const DWC_TERM_BASE: &str = "http://rs.tdwg.org/dwc/terms/";

pub struct DarwinCoreArchiveExporter {
    schema: ParamSchema,
}

impl Default for DarwinCoreArchiveExporter {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![
                ParamField::required("output_dir", ParamType::String),
                ParamField::optional("deterministic_timestamps", ParamType::Bool, json!(false)),
                ParamField::required("core_widget", ParamType::String),
                ParamField::optional("core_row_type", ParamType::String, json!("Occurrence")),
                ParamField::optional("field_mapping", ParamType::Object, json!({})),
                ParamField::optional("extensions", ParamType::List, json!([])),
                ParamField::optional("archive_name", ParamType::String, json!("darwin_core_archive.zip")),
            ]),
        }
    }
}

#[derive(Debug, Clone)]
struct ExtensionSpec {
    widget: String,
    row_type: String,
    field_mapping: BTreeMap<String, String>,
}

#[async_trait]
impl Exporter for DarwinCoreArchiveExporter {
    fn id(&self) -> &str {
        "darwin_core_archive"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn style(&self) -> ExportStyle {
        ExportStyle::WholeArchive
    }

    /// Collects every payload into one zip archive: `occurrence.csv` (the
    /// core), one CSV per declared extension, and `meta.xml`. The archive is
    /// rewritten wholesale on every call, so re-running over the same
    /// payloads is idempotent (§4.3).
    async fn export(&self, payloads: &[WidgetPayload], params: &ParamValues, out_dir: &Path) -> Result<ExportOutcome, ExportError> {
        let core_widget = params.get_str("core_widget").ok_or_else(|| config_error("core_widget"))?;
        let core_row_type = params.get_str("core_row_type").unwrap_or("Occurrence").to_string();
        let core_mapping = object_to_string_map(params.get("field_mapping"));
        let extensions = parse_extensions(params.get("extensions"))?;
        let archive_name = params.get_str("archive_name").unwrap_or("darwin_core_archive.zip").to_string();

        let core_rows = collect_rows(payloads, core_widget);
        let (core_csv, core_terms) = build_table(&core_rows, &core_mapping);

        let mut extension_tables = Vec::new();
        for ext in &extensions {
            let rows = collect_rows(payloads, &ext.widget);
            let (csv_bytes, terms) = build_table(&rows, &ext.field_mapping);
            extension_tables.push((ext.clone(), csv_bytes, terms));
        }

        let meta_xml = build_meta_xml(&core_row_type, &core_terms, &extension_tables)?;

        let archive_path = out_dir.join(&archive_name);
        let file = std::fs::File::create(&archive_path).map_err(|e| write_error(&archive_path, e))?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("occurrence.csv", options).map_err(|e| zip_error(e))?;
        zip.write_all(&core_csv).map_err(|e| write_error(&archive_path, e))?;

        for (ext, csv_bytes, _) in &extension_tables {
            let filename = format!("{}.csv", sanitize_segment(&ext.widget));
            zip.start_file(&filename, options).map_err(|e| zip_error(e))?;
            zip.write_all(csv_bytes).map_err(|e| write_error(&archive_path, e))?;
        }

        zip.start_file("meta.xml", options).map_err(|e| zip_error(e))?;
        zip.write_all(meta_xml.as_bytes()).map_err(|e| write_error(&archive_path, e))?;

        zip.finish().map_err(|e| zip_error(e))?;

        let bytes_written = std::fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        Ok(ExportOutcome { files: vec![archive_path], bytes_written })
    }
}

/// Flattens every payload produced by `widget_id` into `(group_key, row)`
/// pairs. A payload's `data` may be a single object (one row) or an array of
/// objects (one row per item); anything else is skipped.
fn collect_rows<'a>(payloads: &'a [WidgetPayload], widget_id: &str) -> Vec<(&'a str, &'a serde_json::Map<String, Value>)> {
    let mut rows = Vec::new();
    for payload in payloads.iter().filter(|p| p.widget_id == widget_id) {
        match &payload.data {
            Value::Array(items) => {
                for item in items {
                    if let Some(obj) = item.as_object() {
                        rows.push((payload.group_key.as_str(), obj));
                    }
                }
            }
            Value::Object(obj) => rows.push((payload.group_key.as_str(), obj)),
            _ => {}
        }
    }
    rows.sort_by(|a, b| a.0.cmp(b.0));
    rows
}

/// Builds a CSV table with a leading synthesized `id` column followed by
/// every mapped term, in field-name sorted order for determinism. When
/// `field_mapping` is empty, falls back to the row's own keys (minus `id`).
fn build_table(rows: &[(&str, &serde_json::Map<String, Value>)], field_mapping: &BTreeMap<String, String>) -> (Vec<u8>, Vec<String>) {
    let mapping: BTreeMap<String, String> = if field_mapping.is_empty() {
        rows.first()
            .map(|(_, row)| row.keys().filter(|k| *k != "id").map(|k| (k.clone(), k.clone())).collect())
            .unwrap_or_default()
    } else {
        field_mapping.clone()
    };

    let terms: Vec<String> = mapping.keys().cloned().collect();
    let mut header = vec!["id".to_string()];
    header.extend(terms.iter().cloned());

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header).ok();

    for (index, (group_key, row)) in rows.iter().enumerate() {
        let id_value = row
            .get("id")
            .and_then(value_to_cell)
            .unwrap_or_else(|| format!("{group_key}#{index}"));
        let mut record = vec![id_value];
        for term in &terms {
            let source_column = &mapping[term];
            let cell = row.get(source_column).and_then(value_to_cell).unwrap_or_default();
            record.push(cell);
        }
        writer.write_record(&record).ok();
    }

    let bytes = writer.into_inner().unwrap_or_default();
    (bytes, terms)
}

fn value_to_cell(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn object_to_string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_extensions(value: Option<&Value>) -> Result<Vec<ExtensionSpec>, ExportError> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|entry| {
            let widget = entry
                .get("widget")
                .and_then(|v| v.as_str())
                .ok_or_else(|| config_error("extensions[].widget"))?
                .to_string();
            let row_type = entry.get("row_type").and_then(|v| v.as_str()).unwrap_or("MeasurementOrFact").to_string();
            let field_mapping = object_to_string_map(entry.get("field_mapping"));
            Ok(ExtensionSpec { widget, row_type, field_mapping })
        })
        .collect()
}

fn config_error(field: &str) -> ExportError {
    ExportError {
        message: format!("darwin_core_archive exporter requires `{field}`"),
        context: ErrorContext::default().with_plugin("darwin_core_archive").with_field(field),
    }
}

fn write_error(path: &Path, e: std::io::Error) -> ExportError {
    ExportError {
        message: format!("failed to write {}: {e}", path.display()),
        context: ErrorContext::default(),
    }
}

fn zip_error(e: zip::result::ZipError) -> ExportError {
    ExportError {
        message: format!("zip archive error: {e}"),
        context: ErrorContext::default(),
    }
}

fn sanitize_segment(s: &str) -> String {
    s.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

#[derive(Serialize)]
#[serde(rename = "archive")]
struct ArchiveDescriptor {
    #[serde(rename = "@xmlns")]
    xmlns: String,
    core: TableDescriptor,
    #[serde(rename = "extension", skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<TableDescriptor>,
}

#[derive(Serialize)]
struct TableDescriptor {
    #[serde(rename = "@encoding")]
    encoding: String,
    #[serde(rename = "@fieldsTerminatedBy")]
    fields_terminated_by: String,
    #[serde(rename = "@linesTerminatedBy")]
    lines_terminated_by: String,
    #[serde(rename = "@fieldsEnclosedBy")]
    fields_enclosed_by: String,
    #[serde(rename = "@ignoreHeaderLines")]
    ignore_header_lines: u32,
    #[serde(rename = "@rowType")]
    row_type: String,
    files: FilesDescriptor,
    id: IndexDescriptor,
    #[serde(rename = "field")]
    fields: Vec<FieldDescriptor>,
}

#[derive(Serialize)]
struct FilesDescriptor {
    location: String,
}

#[derive(Serialize)]
struct IndexDescriptor {
    #[serde(rename = "@index")]
    index: u32,
}

#[derive(Serialize)]
struct FieldDescriptor {
    #[serde(rename = "@index")]
    index: u32,
    #[serde(rename = "@term")]
    term: String,
}

fn table_descriptor(row_type: &str, location: &str, terms: &[String]) -> TableDescriptor {
    TableDescriptor {
        encoding: "UTF-8".to_string(),
        fields_terminated_by: ",".to_string(),
        lines_terminated_by: "\\n".to_string(),
        fields_enclosed_by: "\"".to_string(),
        ignore_header_lines: 1,
        row_type: format!("{DWC_TERM_BASE}{row_type}"),
        files: FilesDescriptor { location: location.to_string() },
        id: IndexDescriptor { index: 0 },
        fields: terms
            .iter()
            .enumerate()
            .map(|(i, term)| FieldDescriptor { index: (i + 1) as u32, term: format!("{DWC_TERM_BASE}{term}") })
            .collect(),
    }
}

fn build_meta_xml(
    core_row_type: &str,
    core_terms: &[String],
    extension_tables: &[(ExtensionSpec, Vec<u8>, Vec<String>)],
) -> Result<String, ExportError> {
    let descriptor = ArchiveDescriptor {
        xmlns: "http://rs.tdwg.org/dwc/text/".to_string(),
        core: table_descriptor(core_row_type, "occurrence.csv", core_terms),
        extensions: extension_tables
            .iter()
            .map(|(ext, _, terms)| table_descriptor(&ext.row_type, &format!("{}.csv", sanitize_segment(&ext.widget)), terms))
            .collect(),
    };

    let body = quick_xml::se::to_string(&descriptor).map_err(|e| ExportError {
        message: format!("failed to serialize meta.xml: {e}"),
        context: ErrorContext::default().with_plugin("darwin_core_archive"),
    })?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn validated_params(core_widget: &str, field_mapping: Value) -> ParamValues {
        let exporter = DarwinCoreArchiveExporter::default();
        let mut raw = HashMap::new();
        raw.insert("output_dir".to_string(), json!("/tmp/out"));
        raw.insert("core_widget".to_string(), json!(core_widget));
        raw.insert("field_mapping".to_string(), field_mapping);
        exporter.param_schema().validate("darwin_core_archive", &raw).unwrap()
    }

    #[tokio::test]
    async fn emits_a_single_zip_with_the_core_csv() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DarwinCoreArchiveExporter::default();
        let payloads = vec![WidgetPayload::new(
            "Myrtaceae|Eucalyptus|grandis",
            "occurrence_rows",
            json!([
                {"id": "42", "scientific_name": "Eucalyptus grandis"},
                {"id": "43", "scientific_name": "Eucalyptus obliqua"},
            ]),
        )];
        let params = validated_params("occurrence_rows", json!({"scientificName": "scientific_name"}));

        let outcome = exporter.export(&payloads, &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].ends_with("darwin_core_archive.zip"));

        let file = std::fs::File::open(&outcome.files[0]).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len()).map(|i| archive.by_index(i).unwrap().name().to_string()).collect();
        assert!(names.contains(&"occurrence.csv".to_string()));
        assert!(names.contains(&"meta.xml".to_string()));
    }

    #[tokio::test]
    async fn empty_core_still_produces_a_valid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DarwinCoreArchiveExporter::default();
        let params = validated_params("occurrence_rows", json!({}));

        let outcome = exporter.export(&[], &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert!(std::fs::metadata(&outcome.files[0]).unwrap().len() > 0);
    }
}
