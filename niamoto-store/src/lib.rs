//! Embedded columnar and spatial analytical SQL engine (C1).
//!
//! Everything above this crate talks to entity tables only through
//! [`AnalyticalStore`]; nothing outside this crate touches DataFusion,
//! Arrow, or GEOS types directly.

pub mod meta;
pub mod rows;
pub mod spatial;
pub mod store;

pub use rows::{infer_schema, Row};
pub use spatial::{evaluate_predicate, reproject_point, SpatialPredicate};
pub use store::{AnalyticalStore, ColumnInfo, TableInfo, Transaction};
