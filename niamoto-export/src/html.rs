//! `html_page` exporter (§4.3, §6): one HTML file per group plus an index.
//!
//! Templates themselves are an external caller concern (§1 Non-goals list
//! "the content of individual HTML templates"); this exporter only defines
//! the page *structure* — a heading, one section per widget payload, and a
//! generic recursive rendering of the payload's JSON data as nested
//! definition lists. A caller wanting bespoke markup supplies its own
//! exporter plugin; this one is the always-available fallback.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use niamoto_core::error::{ErrorContext, ExportError};
use niamoto_core::payload::WidgetPayload;
use niamoto_plugins::{ExportOutcome, ExportStyle, Exporter, ParamField, ParamSchema, ParamType, ParamValues};

pub struct HtmlPageExporter {
    schema: ParamSchema,
}

impl Default for HtmlPageExporter {
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
impl Exporter for HtmlPageExporter {
    fn id(&self) -> &str {
        "html_page"
    }

    fn param_schema(&self) -> ParamSchema {
        self.schema.clone()
    }

    fn style(&self) -> ExportStyle {
        ExportStyle::PerGroup
    }

    /// Writes one `<sanitized group key>.html` file per group represented in
    /// `payloads`, plus an `index.html` linking to all of them. Re-running
    /// over the same payloads overwrites the same filenames, satisfying the
    /// restartable/idempotent contract (§4.3, §8 scenario 5).
    async fn export(&self, payloads: &[WidgetPayload], params: &ParamValues, out_dir: &Path) -> Result<ExportOutcome, ExportError> {
        let deterministic = params.get_bool("deterministic_timestamps").unwrap_or(false);

        let mut groups: BTreeMap<String, Vec<&WidgetPayload>> = BTreeMap::new();
        for payload in payloads {
            groups.entry(payload.group_key.clone()).or_default().push(payload);
        }

        let mut files = Vec::new();
        let mut bytes_written = 0u64;

        for (group_key, group_payloads) in &groups {
            let path = out_dir.join(format!("{}.html", sanitize_filename(group_key)));
            let html = render_group_page(group_key, group_payloads, deterministic);
            std::fs::write(&path, &html).map_err(|e| write_error(&path, e))?;
            bytes_written += html.len() as u64;
            files.push(path);
        }

        let index_path = out_dir.join("index.html");
        let index_html = render_index(&groups, deterministic);
        std::fs::write(&index_path, &index_html).map_err(|e| write_error(&index_path, e))?;
        bytes_written += index_html.len() as u64;
        files.push(index_path);

        Ok(ExportOutcome { files, bytes_written })
    }
}

fn render_group_page(group_key: &str, payloads: &[&WidgetPayload], deterministic: bool) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>");
    html.push_str(&html_escape(group_key));
    html.push_str("</title></head><body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", html_escape(group_key)));

    let mut sorted = payloads.to_vec();
    sorted.sort_by(|a, b| a.widget_id.cmp(&b.widget_id));

    for payload in sorted {
        html.push_str(&format!("<section data-widget=\"{}\">\n", html_escape(&payload.widget_id)));
        html.push_str(&format!("<h2>{}</h2>\n", html_escape(&payload.widget_id)));
        html.push_str(&render_value(&payload.data));
        if !deterministic {
            html.push_str(&format!("<!-- generated_at: {} -->\n", payload.generated_at.to_rfc3339()));
        }
        html.push_str("</section>\n");
    }
    html.push_str("</body></html>\n");
    html
}

fn render_index(groups: &BTreeMap<String, Vec<&WidgetPayload>>, deterministic: bool) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index</title></head><body>\n<ul>\n");
    for group_key in groups.keys() {
        html.push_str(&format!(
            "<li><a href=\"{}.html\">{}</a></li>\n",
            sanitize_filename(group_key),
            html_escape(group_key)
        ));
    }
    html.push_str("</ul>\n");
    if !deterministic {
        html.push_str(&format!("<!-- generated_at: {} -->\n", chrono::Utc::now().to_rfc3339()));
    }
    html.push_str("</body></html>\n");
    html
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut s = String::from("<dl>\n");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                s.push_str(&format!("<dt>{}</dt><dd>{}</dd>\n", html_escape(key), render_value(&map[key])));
            }
            s.push_str("</dl>\n");
            s
        }
        Value::Array(items) => {
            let mut s = String::from("<ul>\n");
            for item in items {
                s.push_str(&format!("<li>{}</li>\n", render_value(item)));
            }
            s.push_str("</ul>\n");
            s
        }
        Value::Null => "<em>null</em>".to_string(),
        Value::String(s) => html_escape(s),
        other => html_escape(&other.to_string()),
    }
}

fn html_escape(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn sanitize_filename(group_key: &str) -> String {
    group_key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
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

    fn payload(group_key: &str, widget_id: &str, data: Value) -> WidgetPayload {
        WidgetPayload::new(group_key, widget_id, data)
    }

    fn validated_params(deterministic: bool) -> ParamValues {
        let exporter = HtmlPageExporter::default();
        let mut raw = HashMap::new();
        raw.insert("output_dir".to_string(), json!("/tmp/out"));
        raw.insert("deterministic_timestamps".to_string(), json!(deterministic));
        exporter.param_schema().validate("html_page", &raw).unwrap()
    }

    #[tokio::test]
    async fn writes_one_file_per_group_plus_index() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = HtmlPageExporter::default();
        let payloads = vec![
            payload("Myrtaceae|Eucalyptus|grandis", "field_count", json!({"count": 3})),
            payload("Pinaceae|Pinus|radiata", "field_count", json!({"count": 1})),
        ];
        let params = validated_params(true);

        let outcome = exporter.export(&payloads, &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 3);
        assert!(dir.path().join("index.html").exists());
    }

    #[tokio::test]
    async fn deterministic_timestamps_yields_byte_identical_reruns() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = HtmlPageExporter::default();
        let payloads = vec![payload("A", "field_count", json!({"count": 1}))];
        let params = validated_params(true);

        exporter.export(&payloads, &params, dir.path()).await.unwrap();
        let first = std::fs::read(dir.path().join("A.html")).unwrap();
        exporter.export(&payloads, &params, dir.path()).await.unwrap();
        let second = std::fs::read(dir.path().join("A.html")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_payloads_still_emit_index_only() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = HtmlPageExporter::default();
        let params = validated_params(true);

        let outcome = exporter.export(&[], &params, dir.path()).await.unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert!(outcome.files[0].ends_with("index.html"));
    }
}
