//! Import Engine (C4): connectors, dependency ordering, and derived
//! hierarchy materialization that together implement the `import` phase.

pub mod connectors;
pub mod dag;
pub mod engine;
pub mod enrichment;
pub mod hierarchy;
pub mod loader_context;

pub use dag::DependencyGraph;
pub use engine::{EntityImportResult, ImportEngine};
pub use loader_context::StoreLoaderContext;
