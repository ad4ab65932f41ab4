//! Tessera Catalog Core
//!
//! Core types, FQN handling, daily-count aggregation and the SQLite schema
//! for the tessera metadata catalog.

pub mod analytics;
pub mod change;
pub mod container;
pub mod daily_count;
pub mod fqn;
pub mod migrations;
pub mod table;
pub mod validation;

pub use analytics::{
    ColumnJoin, ColumnProfile, ColumnProfilerConfig, CreateTableProfile, CustomMetric,
    DailyCount, JoinedWith, SqlQuery, TableData, TableJoins, TableProfile, TableProfilerConfig,
    UsageStats, UsageSummary,
};
pub use change::{next_version, ChangeDescription, FieldChange};
pub use container::{CatalogEntity, Database, DatabaseSchema, DatabaseService, Location, User};
pub use table::{
    entity_type, Column, ColumnConstraint, ColumnDataType, ConstraintType, DataModel,
    EntityReference, LabelType, Table, TableConstraint, TableType, TagLabel, TagSource, TagState,
    INITIAL_VERSION,
};

/// Kinds of entity-to-entity relationships.
///
/// The ordinal is what gets persisted, so variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    /// Container to child, e.g. schema contains table
    Contains,
    /// User or team owns an entity
    Owns,
    /// Table has a location
    Has,
    /// Two tables or columns are joined in queries
    JoinedWith,
}

impl Relationship {
    pub fn ordinal(self) -> i64 {
        match self {
            Relationship::Contains => 0,
            Relationship::Owns => 1,
            Relationship::Has => 2,
            Relationship::JoinedWith => 3,
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relationship::Contains => write!(f, "contains"),
            Relationship::Owns => write!(f, "owns"),
            Relationship::Has => write!(f, "has"),
            Relationship::JoinedWith => write!(f, "joinedWith"),
        }
    }
}

/// Whether reads should see soft-deleted entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Include {
    #[default]
    NonDeleted,
    All,
}

/// Errors that can occur in catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict detected: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl CatalogError {
    /// Not-found error for an entity looked up by id or name.
    pub fn entity_not_found(entity_type: &str, key: impl std::fmt::Display) -> Self {
        CatalogError::NotFound(format!("{} instance for {} not found", entity_type, key))
    }
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Initialize the SQLite schema for the catalog
///
/// Creates all necessary tables if they don't exist:
/// - `entities`: JSON documents for tables, schemas, services, users, ...
/// - `entity_relationship`: typed edges between entity ids
/// - `field_relationship`: typed edges between FQNs with a JSON payload
/// - `entity_extension`: key/value facts keyed by (entity id, extension)
/// - `entity_extension_time_series`: facts keyed by (FQN, extension, timestamp)
/// - `tag` / `tag_usage`: tag definitions and their applications
pub fn init_sqlite_schema(conn: &rusqlite::Connection) -> Result<()> {
    let ddl = r#"
    -- Entity documents
    CREATE TABLE IF NOT EXISTS entities (
      id TEXT PRIMARY KEY,
      entity_type TEXT NOT NULL,
      name TEXT NOT NULL,
      fqn TEXT NOT NULL,
      json TEXT NOT NULL,
      version REAL NOT NULL,
      updated_at TEXT NOT NULL,
      updated_by TEXT NOT NULL,
      UNIQUE(entity_type, fqn)
    );

    CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

    -- Relationships between entity ids
    CREATE TABLE IF NOT EXISTS entity_relationship (
      from_id TEXT NOT NULL,
      to_id TEXT NOT NULL,
      from_entity TEXT NOT NULL,
      to_entity TEXT NOT NULL,
      relation INTEGER NOT NULL,
      PRIMARY KEY (from_id, to_id, relation)
    );

    CREATE INDEX IF NOT EXISTS idx_entity_relationship_to ON entity_relationship(to_id, relation);

    -- Relationships between FQNs (join statistics)
    CREATE TABLE IF NOT EXISTS field_relationship (
      from_fqn TEXT NOT NULL,
      to_fqn TEXT NOT NULL,
      from_type TEXT NOT NULL,
      to_type TEXT NOT NULL,
      relation INTEGER NOT NULL,
      json_schema TEXT,
      json TEXT,
      PRIMARY KEY (from_fqn, to_fqn, from_type, to_type, relation)
    );

    CREATE INDEX IF NOT EXISTS idx_field_relationship_to ON field_relationship(to_fqn);

    -- Key/value extensions
    CREATE TABLE IF NOT EXISTS entity_extension (
      id TEXT NOT NULL,
      extension TEXT NOT NULL,
      json_schema TEXT NOT NULL,
      json TEXT NOT NULL,
      PRIMARY KEY (id, extension)
    );

    -- Time-series extensions
    CREATE TABLE IF NOT EXISTS entity_extension_time_series (
      entity_fqn TEXT NOT NULL,
      extension TEXT NOT NULL,
      json_schema TEXT NOT NULL,
      json TEXT NOT NULL,
      timestamp INTEGER NOT NULL,
      UNIQUE(entity_fqn, extension, timestamp)
    );

    -- Tag definitions
    CREATE TABLE IF NOT EXISTS tag (
      fqn TEXT PRIMARY KEY,
      description TEXT,
      associated_tags TEXT
    );

    -- Tag applications
    CREATE TABLE IF NOT EXISTS tag_usage (
      source INTEGER NOT NULL,
      tag_fqn TEXT NOT NULL,
      label_type INTEGER NOT NULL,
      state INTEGER NOT NULL,
      target_fqn TEXT NOT NULL,
      UNIQUE(source, tag_fqn, target_fqn)
    );

    CREATE INDEX IF NOT EXISTS idx_tag_usage_target ON tag_usage(target_fqn);
    "#;

    conn.execute_batch(ddl)?;
    Ok(())
}

/// Initialize the catalog: base schema + migrations.
///
/// This is the recommended entry point for catalog initialization. It:
/// 1. Creates the base schema (tables, indexes)
/// 2. Runs any pending migrations to bring the schema up to date
///
/// The function is idempotent - safe to call multiple times.
///
/// # Returns
///
/// The number of migrations applied (0 if already up to date).
pub fn init_catalog(conn: &rusqlite::Connection, run_migrations_flag: bool) -> Result<usize> {
    init_sqlite_schema(conn)?;

    if run_migrations_flag {
        migrations::run_migrations(conn)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &rusqlite::Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_init_schema() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_sqlite_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "entities",
            "entity_relationship",
            "field_relationship",
            "entity_extension",
            "entity_extension_time_series",
            "tag",
            "tag_usage",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_init_catalog() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();

        let count = init_catalog(&conn, true).unwrap();
        assert!(count > 0);
        assert!(table_names(&conn).contains(&"entity_versions".to_string()));

        // Second call should be idempotent
        let count2 = init_catalog(&conn, true).unwrap();
        assert_eq!(count2, 0);
    }

    #[test]
    fn test_init_catalog_without_migrations() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();

        let count = init_catalog(&conn, false).unwrap();
        assert_eq!(count, 0);

        let tables = table_names(&conn);
        assert!(tables.contains(&"entities".to_string()));
        assert!(!tables.contains(&"entity_versions".to_string()));
    }

    #[test]
    fn test_relationship_ordinals_are_stable() {
        assert_eq!(Relationship::Contains.ordinal(), 0);
        assert_eq!(Relationship::Owns.ordinal(), 1);
        assert_eq!(Relationship::Has.ordinal(), 2);
        assert_eq!(Relationship::JoinedWith.ordinal(), 3);
    }

    #[test]
    fn test_not_found_message() {
        let err = CatalogError::entity_not_found("table", "svc.db.public.orders");
        assert_eq!(
            err.to_string(),
            "Not found: table instance for svc.db.public.orders not found"
        );
    }
}
