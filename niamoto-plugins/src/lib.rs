//! Plugin capability traits, parameter schema validation, and the built-in
//! plugin set (C3).

pub mod builtin;
pub mod registry;
pub mod schema;
pub mod traits;

pub use builtin::register_builtins;
pub use registry::PluginRegistry;
pub use schema::{ParamField, ParamSchema, ParamType, ParamValues};
pub use traits::{Capability, ExportOutcome, ExportStyle, Exporter, Inputs, Loader, LoaderContext, LoaderOutcome, Row, Transformer, Widget};
