//! Plugin capability traits (§4.3).
//!
//! Plugins are polymorphic units classified by capability rather than by a
//! class hierarchy: `Loader | Transformer | Exporter | Widget`, each with an
//! explicit contract. Plugins receive only dependency-injected handles, never
//! direct access to the store or registry, so they stay portable across
//! entity shapes (§9 DESIGN NOTES, "global config/database singletons...
//! replaced by dependency injection").

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use niamoto_core::error::{ExportError, LoaderError, TransformError};
use niamoto_core::payload::WidgetPayload;

use crate::schema::{ParamSchema, ParamValues};

/// A row is a plain JSON object, the same shape the store hands back from
/// `execute` (§4.3: "plugins receive materialized row collections, not
/// store handles").
pub type Row = serde_json::Map<String, Value>;

/// Named row sets keyed by the `source.name` declared in the transform
/// section's `sources` list.
pub type Inputs = HashMap<String, Vec<Row>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Loader,
    Transformer,
    Exporter,
    Widget,
}

/// Narrow handle a loader uses to write enrichment columns back onto an
/// already-materialized entity, supplied by the orchestrator. Defined here
/// (rather than depending on `niamoto-store` directly) so this crate stays
/// decoupled from the storage engine's concrete type.
#[async_trait]
pub trait LoaderContext: Send + Sync {
    async fn write_columns(
        &self,
        entity: &str,
        updates: Vec<(Value, HashMap<String, Value>)>,
    ) -> Result<u64, LoaderError>;
}

pub struct LoaderOutcome {
    pub rows_updated: u64,
    pub warnings: Vec<String>,
}

/// Populates columns on an already-materialized entity from a secondary
/// source (e.g. API enrichment).
#[async_trait]
pub trait Loader: Send + Sync {
    fn id(&self) -> &str;
    fn param_schema(&self) -> ParamSchema;

    async fn load(
        &self,
        entity_ref: &str,
        params: &ParamValues,
        ctx: &dyn LoaderContext,
    ) -> Result<LoaderOutcome, LoaderError>;
}

/// Computes a structured payload from one or more entity row sets for a
/// single group. Must be a pure, deterministic function of `inputs` and
/// `params` (§4.3, §8 invariant 5).
pub trait Transformer: Send + Sync {
    fn id(&self) -> &str;
    fn param_schema(&self) -> ParamSchema;

    /// Declares whether the orchestrator may offload this transformer's
    /// groups to the bounded worker pool (§5). Built-ins are pure by
    /// default; override to `false` for anything with side effects.
    fn is_pure(&self) -> bool {
        true
    }

    fn transform(&self, inputs: &Inputs, params: &ParamValues, group_key: &str) -> Result<Value, TransformError>;
}

/// A transformer that additionally knows how to render its payload as HTML
/// markup for the page exporter.
pub trait Widget: Transformer {
    fn render(&self, payload: &Value) -> Result<String, TransformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStyle {
    PerGroup,
    WholeArchive,
}

pub struct ExportOutcome {
    pub files: Vec<std::path::PathBuf>,
    pub bytes_written: u64,
}

/// Writes files given a collection of payloads plus registry/context. Must
/// be restartable: re-running over the same output directory with the same
/// payloads is idempotent (§4.3, §8 scenario 5).
#[async_trait]
pub trait Exporter: Send + Sync {
    fn id(&self) -> &str;
    fn param_schema(&self) -> ParamSchema;
    fn style(&self) -> ExportStyle;

    async fn export(
        &self,
        payloads: &[WidgetPayload],
        params: &ParamValues,
        out_dir: &Path,
    ) -> Result<ExportOutcome, ExportError>;
}
