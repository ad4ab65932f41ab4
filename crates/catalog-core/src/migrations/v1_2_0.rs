//! Migration v1.2.0: Soft delete.
//!
//! Adds the `deleted` flag to `entities` and an index for walking
//! relationships from their source. Deleted entities stay in place so
//! that their history and relationships remain readable with `Include::All`.

use super::{ColumnAddition, Migration};

/// Format: MAJOR * 1_000_000 + MINOR * 1_000 + PATCH
pub const VERSION: i64 = 1_002_000;

const ADD_COLUMNS: &[ColumnAddition] = &[ColumnAddition {
    table: "entities",
    column: "deleted",
    definition: "INTEGER NOT NULL DEFAULT 0",
}];

pub fn migration() -> Migration {
    Migration {
        version: VERSION,
        description: "v1.2.0: Soft delete",
        sql: SQL,
        add_columns: ADD_COLUMNS,
    }
}

const SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entity_relationship_from ON entity_relationship(from_id, relation);
"#;
