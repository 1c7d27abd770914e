//! Shared data model, configuration document, and error taxonomy for Niamoto.
//!
//! This crate has no I/O of its own: it only defines the types that every
//! other crate in the workspace passes across its boundaries, so that
//! `niamoto-store`, `niamoto-registry`, `niamoto-plugins`, `niamoto-import`
//! and `niamoto-orchestrator` share one vocabulary instead of translating at
//! every seam.

pub mod config;
pub mod entity;
pub mod error;
pub mod payload;

pub use config::NiamotoConfig;
pub use entity::{Entity, EntityKind, EntityLink, EntityMetadata, FieldDef, SemanticType};
pub use error::{NiamotoError, Result};
pub use payload::{PipelineRun, RunError, RunPhase, RunStatus, WidgetPayload};
