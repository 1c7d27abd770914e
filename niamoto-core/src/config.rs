//! Configuration document model (§6).
//!
//! `NiamotoConfig` is the parsed form of the three-section configuration
//! document (`import`, `transform`, `export`). Unknown keys are rejected at
//! parse time so typos surface as `ConfigError` instead of silently being
//! ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ErrorContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NiamotoConfig {
    pub version: String,
    pub import: ImportConfig,
    #[serde(default)]
    pub transform: Vec<TransformSection>,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    pub entities: ImportEntities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportEntities {
    #[serde(default)]
    pub datasets: HashMap<String, DatasetSpec>,
    #[serde(default)]
    pub references: HashMap<String, ReferenceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFieldSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub r#type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSpec {
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<SchemaFieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    pub peer_entity: String,
    pub local_field: String,
    pub peer_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub connector: ConnectorSpec,
    pub schema: SchemaSpec,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchySpec {
    pub levels: Vec<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default = "default_incomplete_rows")]
    pub incomplete_rows: IncompleteRowsPolicy,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteRowsPolicy {
    Skip,
    FillUnknown,
    Error,
}

fn default_incomplete_rows() -> IncompleteRowsPolicy {
    IncompleteRowsPolicy::Skip
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    HashPath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentSpec {
    pub plugin: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Flat,
    Hierarchical,
    Spatial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceSpec {
    pub kind: ReferenceKind,
    pub connector: ConnectorSpec,
    pub schema: SchemaSpec,
    #[serde(default)]
    pub hierarchy: Option<HierarchySpec>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentSpec>,
}

/// Connector kind plus its configuration, tagged on the wire by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ConnectorSpec {
    File {
        path: String,
    },
    FileMultiFeature {
        sources: Vec<MultiFeatureSource>,
    },
    Derived {
        source_entity: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiFeatureSource {
    pub name: String,
    pub path: String,
    pub name_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceRelation {
    pub plugin: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSource {
    pub name: String,
    pub data: String,
    #[serde(default)]
    pub relation: Option<SourceRelation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetSpec {
    pub plugin: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSection {
    pub group_by: String,
    pub sources: Vec<TransformSource>,
    pub widgets: HashMap<String, WidgetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDescriptor {
    pub entity: String,
    pub widgets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportTargetParams {
    pub output_dir: String,
    pub groups: Vec<GroupDescriptor>,
    #[serde(default)]
    pub deterministic_timestamps: bool,
    /// Exporter-specific parameters beyond the two every exporter shares
    /// (`output_dir`, `deterministic_timestamps`) — e.g. `darwin_core_archive`'s
    /// `core_widget`/`field_mapping`/`extensions`.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportTarget {
    pub name: String,
    pub exporter: String,
    pub params: ExportTargetParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default)]
    pub targets: Vec<ExportTarget>,
}

impl NiamotoConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError {
            message: e.to_string(),
            context: ErrorContext::default(),
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError {
            message: e.to_string(),
            context: ErrorContext::default(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError {
            message: e.to_string(),
            context: ErrorContext::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
version: "2.0"
import:
  entities:
    datasets:
      occurrences:
        connector:
          kind: file
          path: "data/occurrences.csv"
        schema:
          id_field: id
          fields:
            - { source: id, target: id }
            - { source: family, target: family }
        links: []
    references:
      taxonomy:
        kind: hierarchical
        connector:
          kind: derived
          source_entity: occurrences
        schema:
          fields: []
        hierarchy:
          levels: [family, genus, species]
          incomplete_rows: skip
transform: []
export:
  targets: []
"#
    }

    #[test]
    fn parses_minimal_document() {
        let cfg = NiamotoConfig::from_yaml(sample_yaml()).expect("valid config");
        assert_eq!(cfg.version, "2.0");
        assert!(cfg.import.entities.datasets.contains_key("occurrences"));
        assert!(cfg.import.entities.references.contains_key("taxonomy"));
    }

    #[test]
    fn round_trips_through_yaml() {
        let cfg = NiamotoConfig::from_yaml(sample_yaml()).expect("valid config");
        let serialized = cfg.to_yaml().expect("serialize");
        let reparsed = NiamotoConfig::from_yaml(&serialized).expect("reparse");
        assert_eq!(cfg.version, reparsed.version);
        assert_eq!(
            cfg.import.entities.datasets.len(),
            reparsed.import.entities.datasets.len()
        );
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let text = format!("{}\nbogus: true\n", sample_yaml());
        assert!(NiamotoConfig::from_yaml(&text).is_err());
    }
}
