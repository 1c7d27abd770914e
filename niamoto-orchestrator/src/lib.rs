//! Transform/Export Orchestrator (C5): grouping, bounded-concurrency
//! plugin invocation, the in-memory payload store, and export drive.

pub mod export;
pub mod payload_store;
pub mod run_log;
pub mod transform;

pub use export::ExportOrchestrator;
pub use payload_store::PayloadStore;
pub use transform::TransformOrchestrator;
