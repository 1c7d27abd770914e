//! Error taxonomy.
//!
//! One `thiserror` enum per concern, each carrying an [`ErrorContext`] so a
//! caller can identify which entity/group/plugin/field was involved without
//! parsing the message string. [`NiamotoError`] is the top-level enum that
//! library code returns; `anyhow` is reserved for the CLI boundary.

use thiserror::Error;

/// Where in the pipeline an error occurred. All fields are optional because
/// not every error has every coordinate (a `ConfigError` has no group, a
/// `TransformError` usually has no field).
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub entity: Option<String>,
    pub group: Option<String>,
    pub plugin: Option<String>,
    pub field: Option<String>,
}

impl ErrorContext {
    pub fn entity(name: impl Into<String>) -> Self {
        Self { entity: Some(name.into()), ..Default::default() }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(e) = &self.entity {
            parts.push(format!("entity={e}"));
        }
        if let Some(g) = &self.group {
            parts.push(format!("group={g}"));
        }
        if let Some(p) = &self.plugin {
            parts.push(format!("plugin={p}"));
        }
        if let Some(fld) = &self.field {
            parts.push(format!("field={fld}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Error)]
#[error("config error: {message} ({context})")]
pub struct ConfigError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("schema error: {message} ({context})")]
pub struct SchemaError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("ingest error: {message} ({context})")]
pub struct IngestError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("registry error: {message} ({context})")]
pub struct RegistryError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("integrity error: {message} ({context})")]
pub struct IntegrityError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("transform error: {message} ({context})")]
pub struct TransformError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("export error: {message} ({context})")]
pub struct ExportError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("loader error (retryable={retryable}): {message} ({context})")]
pub struct LoaderError {
    pub message: String,
    pub retryable: bool,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("timeout error: {message} ({context})")]
pub struct TimeoutError {
    pub message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Error)]
#[error("query error: {message} ({context})")]
pub struct QueryError {
    pub message: String,
    pub context: ErrorContext,
}

/// Top-level error type returned by every library crate in the workspace.
#[derive(Debug, Error)]
pub enum NiamotoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl NiamotoError {
    /// True for the class of errors that failure-isolation allows a run to
    /// continue past (transform/export/loader-retryable), as opposed to
    /// errors that must abort the whole run (config/schema/registry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NiamotoError::Transform(_)
                | NiamotoError::Export(_)
                | NiamotoError::Loader(LoaderError { retryable: true, .. })
        )
    }
}

pub type Result<T, E = NiamotoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_renders_only_present_fields() {
        let ctx = ErrorContext::entity("occurrences").with_group("species=A");
        assert_eq!(ctx.to_string(), "entity=occurrences group=species=A");
    }

    #[test]
    fn transform_and_export_errors_are_recoverable() {
        let err = NiamotoError::Transform(TransformError {
            message: "boom".into(),
            context: ErrorContext::default(),
        });
        assert!(err.is_recoverable());

        let err = NiamotoError::Registry(RegistryError {
            message: "boom".into(),
            context: ErrorContext::default(),
        });
        assert!(!err.is_recoverable());
    }

    #[test]
    fn loader_error_recoverability_depends_on_retryable_flag() {
        let retryable = NiamotoError::Loader(LoaderError {
            message: "timed out".into(),
            retryable: true,
            context: ErrorContext::default(),
        });
        assert!(retryable.is_recoverable());

        let fatal = NiamotoError::Loader(LoaderError {
            message: "malformed source".into(),
            retryable: false,
            context: ErrorContext::default(),
        });
        assert!(!fatal.is_recoverable());
    }
}
