//! Spatial predicate and CRS support.
//!
//! DataFusion has no native geometry type, so spatial evaluation happens in
//! Rust over WKT columns rather than through SQL functions: geometries are
//! parsed with `geos`, predicates evaluated with `geos`, and reprojection
//! done with `proj`. Grounded on the `geos`/`proj` pairing in
//! `examples/other_examples/93ba1dc6_raif-s-naffah-ogc-cql2`.

use std::sync::OnceLock;

use geos::{Geom, Geometry};
use proj::Proj;

use niamoto_core::error::{ErrorContext, QueryError};

/// Binary spatial relationships the store can evaluate between two WKT
/// geometries. Named after the OGC predicate set the grounding source
/// evaluates over GeoPackage sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialPredicate {
    Intersects,
    Contains,
    Within,
    Touches,
    Disjoint,
}

/// Idempotent, lazily-initialized probe for whether the spatial extension
/// (GEOS) loaded successfully in this process. Mirrors the `spatial_enabled`
/// contract in §4.1: "the loader is idempotent and attempted on first
/// spatial operation".
#[derive(Default)]
pub struct SpatialProbe {
    loaded: OnceLock<bool>,
}

impl SpatialProbe {
    pub fn ensure_loaded(&self) -> bool {
        *self.loaded.get_or_init(|| Geometry::new_from_wkt("POINT (0 0)").is_ok())
    }
}

pub fn evaluate_predicate(lhs_wkt: &str, rhs_wkt: &str, predicate: SpatialPredicate) -> Result<bool, QueryError> {
    let lhs = parse_wkt(lhs_wkt)?;
    let rhs = parse_wkt(rhs_wkt)?;
    let result = match predicate {
        SpatialPredicate::Intersects => lhs.intersects(&rhs),
        SpatialPredicate::Contains => lhs.contains(&rhs),
        SpatialPredicate::Within => lhs.within(&rhs),
        SpatialPredicate::Touches => lhs.touches(&rhs),
        SpatialPredicate::Disjoint => lhs.disjoint(&rhs),
    };
    result.map_err(|e| QueryError {
        message: format!("spatial predicate evaluation failed: {e}"),
        context: ErrorContext::default(),
    })
}

fn parse_wkt(wkt: &str) -> Result<Geometry, QueryError> {
    Geometry::new_from_wkt(wkt).map_err(|e| QueryError {
        message: format!("invalid geometry WKT `{wkt}`: {e}"),
        context: ErrorContext::default(),
    })
}

/// Reprojects a point from `from_crs` to `to_crs`, both given as
/// `"EPSG:<code>"` or a PROJ string, validating the CRS declaration an
/// entity's metadata carries (§3: "geometries share a single declared
/// coordinate reference system").
pub fn reproject_point(from_crs: &str, to_crs: &str, x: f64, y: f64) -> Result<(f64, f64), QueryError> {
    let transform = Proj::new_known_crs(from_crs, to_crs, None).map_err(|e| QueryError {
        message: format!("failed to build transform {from_crs} -> {to_crs}: {e}"),
        context: ErrorContext::default(),
    })?;
    transform.convert((x, y)).map_err(|e| QueryError {
        message: format!("failed to reproject point: {e}"),
        context: ErrorContext::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_loaded_once_and_stays_consistent() {
        let probe = SpatialProbe::default();
        assert!(probe.ensure_loaded());
        assert!(probe.ensure_loaded());
    }

    #[test]
    fn intersects_detects_overlapping_geometries() {
        let a = "POLYGON ((0 0, 0 2, 2 2, 2 0, 0 0))";
        let b = "POLYGON ((1 1, 1 3, 3 3, 3 1, 1 1))";
        assert!(evaluate_predicate(a, b, SpatialPredicate::Intersects).unwrap());
    }

    #[test]
    fn disjoint_geometries_do_not_intersect() {
        let a = "POLYGON ((0 0, 0 1, 1 1, 1 0, 0 0))";
        let b = "POLYGON ((5 5, 5 6, 6 6, 6 5, 5 5))";
        assert!(evaluate_predicate(a, b, SpatialPredicate::Disjoint).unwrap());
        assert!(!evaluate_predicate(a, b, SpatialPredicate::Intersects).unwrap());
    }

    #[test]
    fn invalid_wkt_surfaces_as_query_error() {
        assert!(evaluate_predicate("not a geometry", "POINT (0 0)", SpatialPredicate::Intersects).is_err());
    }
}
