//! `json_api` exporter (§4.3, §6): one JSON document per payload plus an
//! index, addressed by the payload's `(group_key, widget_id)` key as the
//! spec requires ("documents use payload key as path").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use niamoto_core::error::{ErrorContext, ExportError};
use niamoto_core::payload::WidgetPayload;
use niamoto_plugins::{ExportOutcome, ExportStyle, Exporter, ParamField, ParamSchema, ParamType, ParamValues};

pub struct JsonApiExporter {
    schema: ParamSchema,
}

impl Default for JsonApiExporter {
    fn default() -> Self {
        Self {
            schema: ParamSchema::new(vec![
                ParamField::required("output_dir", ParamType::String),
                ParamField::optional("deterministic_timestamps", ParamType::Bool, json!(false)),
            ]),
        }
    }
}

#[async_trait]
impl Exporter for JsonApiExporter {
    fn id(&self) -> &str {
        "json_api"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn style(&self) -> ExportStyle {
        ExportStyle::WholeArchive
    }

    /// Collects every payload into one invocation (§4.5 whole-archive
    /// style): each document lands at `<group_key path>/<widget_id>.json`,
    /// and `index.json` enumerates every document written.
    async fn export(&self, payloads: &[WidgetPayload], params: &ParamValues, out_dir: &Path) -> Result<ExportOutcome, ExportError> {
        let deterministic = params.get_bool("deterministic_timestamps").unwrap_or(false);

        let mut sorted = payloads.to_vec();
        sorted.sort_by(|a, b| (a.group_key.as_str(), a.widget_id.as_str()).cmp(&(b.group_key.as_str(), b.widget_id.as_str())));

        let mut files = Vec::new();
        let mut bytes_written = 0u64;
        let mut index_entries = Vec::new();

        for payload in &sorted {
            let rel_dir = sanitize_path_segments(&payload.group_key);
            let dir = out_dir.join(&rel_dir);
            std::fs::create_dir_all(&dir).map_err(|e| write_error(&dir, e))?;

            let rel_path = rel_dir.join(format!("{}.json", sanitize_segment(&payload.widget_id)));
            let file_path = out_dir.join(&rel_path);

            let mut document = json!({
                "group_key": payload.group_key,
                "widget_id": payload.widget_id,
                "data": payload.data,
            });
            if !deterministic {
                document["generated_at"] = json!(payload.generated_at.to_rfc3339());
            }

            let body = serde_json::to_vec_pretty(&document).map_err(|e| ExportError {
                message: format!("failed to serialize payload for {}: {e}", payload.group_key),
                context: ErrorContext::default().with_group(&payload.group_key).with_plugin(&payload.widget_id),
            })?;
            std::fs::write(&file_path, &body).map_err(|e| write_error(&file_path, e))?;
            bytes_written += body.len() as u64;

            index_entries.push(json!({
                "group_key": payload.group_key,
                "widget_id": payload.widget_id,
                "path": path_display(&rel_path),
            }));
            files.push(file_path);
        }

        let index_path = out_dir.join("index.json");
        let index_body = serde_json::to_vec_pretty(&json!({ "documents": index_entries })).map_err(|e| ExportError {
            message: format!("failed to serialize index: {e}"),
            context: ErrorContext::default(),
        })?;
        std::fs::write(&index_path, &index_body).map_err(|e| write_error(&index_path, e))?;
        bytes_written += index_body.len() as u64;
        files.push(index_path);

        Ok(ExportOutcome { files, bytes_written })
    }
}

fn sanitize_segment(s: &str) -> String {
    s.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

fn sanitize_path_segments(group_key: &str) -> PathBuf {
    let mut path = PathBuf::new();
    for segment in group_key.split('|') {
        path.push(sanitize_segment(segment));
    }
    path
}

fn path_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn write_error(path: &Path, e: std::io::Error) -> ExportError {
    ExportError {
        message: format!("failed to write {}: {e}", path.display()),
        context: ErrorContext::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn validated_params(deterministic: bool) -> ParamValues {
        let exporter = JsonApiExporter::default();
        let mut raw = HashMap::new();
        raw.insert("output_dir".to_string(), json!("/tmp/out"));
        raw.insert("deterministic_timestamps".to_string(), json!(deterministic));
        exporter.param_schema().validate("json_api", &raw).unwrap()
    }

    #[tokio::test]
    async fn writes_one_document_per_payload_and_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonApiExporter::default();
        let payloads = vec![
            WidgetPayload::new("Myrtaceae|Eucalyptus|grandis", "field_count", json!({"count": 3})),
            WidgetPayload::new("Myrtaceae|Eucalyptus|grandis", "mean", json!({"value": 20.0})),
        ];
        let params = validated_params(true);

        let outcome = exporter.export(&payloads, &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 3);

        let doc = std::fs::read_to_string(dir.path().join("Myrtaceae/Eucalyptus/grandis/mean.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&doc).unwrap();
        assert_eq!(parsed["widget_id"], "mean");
        assert!(parsed.get("generated_at").is_none());
    }

    #[tokio::test]
    async fn empty_dataset_emits_index_only_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonApiExporter::default();
        let params = validated_params(true);

        let outcome = exporter.export(&[], &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 1);
        let index: serde_json::Value = serde_json::from_slice(&std::fs::read(&outcome.files[0]).unwrap()).unwrap();
        assert_eq!(index["documents"].as_array().unwrap().len(), 0);
    }
}
