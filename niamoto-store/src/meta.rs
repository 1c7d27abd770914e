//! Names reserved by the `_niamoto_meta` schema (§6 persisted state layout).
//!
//! The registry, run bookkeeping and run-error log are themselves stored as
//! tables under this schema, so inspecting them is a normal SQL query rather
//! than a side-channel API.

pub const META_SCHEMA: &str = "_niamoto_meta";

pub const TABLE_ENTITIES: &str = "entities";
pub const TABLE_ENTITY_FIELDS: &str = "entity_fields";
pub const TABLE_ENTITY_LINKS: &str = "entity_links";
pub const TABLE_RUNS: &str = "runs";
pub const TABLE_RUN_ERRORS: &str = "run_errors";

pub fn is_reserved(table: &str) -> bool {
    matches!(
        table,
        TABLE_ENTITIES | TABLE_ENTITY_FIELDS | TABLE_ENTITY_LINKS | TABLE_RUNS | TABLE_RUN_ERRORS
    )
}
