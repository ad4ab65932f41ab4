//! Migration v1.1.0: Entity version history.
//!
//! Every accepted change to an entity stores the previous document together
//! with the change description that produced the new version, so that
//! `list_versions` / `get_version` can serve historical snapshots.

use super::Migration;

/// Format: MAJOR * 1_000_000 + MINOR * 1_000 + PATCH
pub const VERSION: i64 = 1_001_000;

pub fn migration() -> Migration {
    Migration {
        version: VERSION,
        description: "v1.1.0: Entity version history",
        sql: SQL,
        add_columns: &[],
    }
}

const SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entity_versions (
  id TEXT NOT NULL,
  entity_type TEXT NOT NULL,
  version REAL NOT NULL,
  json TEXT NOT NULL,
  change_description TEXT,
  updated_at TEXT NOT NULL,
  updated_by TEXT NOT NULL,
  PRIMARY KEY (id, version)
);

CREATE INDEX IF NOT EXISTS idx_entity_versions_id ON entity_versions(id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use rusqlite::Connection;

    #[test]
    fn test_migration_version() {
        assert_eq!(VERSION, 1_001_000);
        assert!(migration().description.contains("v1.1.0"));
    }

    #[test]
    fn test_entity_versions_table_created() {
        let conn = Connection::open_in_memory().unwrap();
        crate::init_sqlite_schema(&conn).unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO entity_versions (id, entity_type, version, json, updated_at, updated_by)
             VALUES ('t1', 'table', 0.1, '{}', '2024-01-01T00:00:00Z', 'admin')",
            [],
        )
        .unwrap();

        // (id, version) is the key
        let dup = conn.execute(
            "INSERT INTO entity_versions (id, entity_type, version, json, updated_at, updated_by)
             VALUES ('t1', 'table', 0.1, '{}', '2024-01-01T00:00:00Z', 'admin')",
            [],
        );
        assert!(dup.is_err());
    }
}
