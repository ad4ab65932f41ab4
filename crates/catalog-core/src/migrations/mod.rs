//! Versioned schema migrations.
//!
//! The base DDL in [`crate::init_sqlite_schema`] only ever creates tables.
//! Everything after that is a numbered [`Migration`], applied once, in
//! order, and recorded in `schema_migrations`. A single-row advisory lock in
//! `migration_lock` keeps two processes from migrating the same file at the
//! same time; a lock held for more than five minutes is treated as abandoned.
//!
//! ```rust,ignore
//! let conn = rusqlite::Connection::open("catalog.db")?;
//! tessera_catalog_core::init_sqlite_schema(&conn)?;
//! let applied = tessera_catalog_core::migrations::run_migrations(&conn)?;
//! ```

use std::collections::BTreeSet;

use rusqlite::{params, Connection};

use crate::{CatalogError, Result};

mod v1_1_0;
mod v1_2_0;

/// `MAJOR * 1_000_000 + MINOR * 1_000 + PATCH`
pub type MigrationVersion = i64;

/// A column added by a migration. SQLite has no `ADD COLUMN IF NOT EXISTS`,
/// so these are checked against `PRAGMA table_info` before altering.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAddition {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: MigrationVersion,
    pub description: &'static str,
    /// Idempotent DDL run inside the migration transaction
    pub sql: &'static str,
    pub add_columns: &'static [ColumnAddition],
}

/// A row of `schema_migrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: MigrationVersion,
    pub description: String,
    pub applied_at: String,
}

/// Every known migration, oldest first.
pub fn all_migrations() -> [Migration; 2] {
    [v1_1_0::migration(), v1_2_0::migration()]
}

const BOOKKEEPING_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  description TEXT NOT NULL,
  applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS migration_lock (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  locked_at TEXT,
  locked_by TEXT
);

INSERT OR IGNORE INTO migration_lock (id) VALUES (1);
"#;

fn ensure_bookkeeping(conn: &Connection) -> Result<()> {
    conn.execute_batch(BOOKKEEPING_DDL)?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Add the column unless it is already there. Returns whether it was added.
fn add_column(conn: &Connection, addition: &ColumnAddition) -> Result<bool> {
    if has_column(conn, addition.table, addition.column)? {
        tracing::debug!(
            table = addition.table,
            column = addition.column,
            "Column present"
        );
        return Ok(false);
    }

    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        addition.table, addition.column, addition.definition
    ))?;
    tracing::info!(
        table = addition.table,
        column = addition.column,
        "Added column"
    );
    Ok(true)
}

/// Held advisory lock; released on drop.
struct MigrationLock<'c> {
    conn: &'c Connection,
}

impl<'c> MigrationLock<'c> {
    /// `None` if a live lock is held elsewhere.
    fn try_acquire(conn: &'c Connection) -> Result<Option<Self>> {
        let taken = conn.execute(
            "UPDATE migration_lock
             SET locked_at = datetime('now'), locked_by = ?1
             WHERE id = 1 AND (locked_at IS NULL OR locked_at < datetime('now', '-5 minutes'))",
            [format!("tessera:{}", std::process::id())],
        )?;
        Ok((taken == 1).then(|| Self { conn }))
    }
}

impl Drop for MigrationLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute(
            "UPDATE migration_lock SET locked_at = NULL, locked_by = NULL WHERE id = 1",
            [],
        ) {
            tracing::warn!(error = %e, "Could not release migration lock");
        }
    }
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<MigrationVersion>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(versions)
}

/// Highest applied migration, 0 for a fresh catalog.
pub fn get_schema_version(conn: &Connection) -> Result<MigrationVersion> {
    ensure_bookkeeping(conn)?;
    Ok(applied_versions(conn)?.last().copied().unwrap_or(0))
}

/// Migrations not yet applied, oldest first.
pub fn pending_migrations(conn: &Connection) -> Result<Vec<Migration>> {
    ensure_bookkeeping(conn)?;
    let applied = applied_versions(conn)?;
    Ok(all_migrations()
        .into_iter()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

pub fn needs_migration(conn: &Connection) -> Result<bool> {
    Ok(!pending_migrations(conn)?.is_empty())
}

/// Apply every pending migration and return how many ran.
///
/// Fails with [`CatalogError::Other`] if another runner holds the lock.
/// Each migration commits on its own, so a failure keeps the ones before it.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    ensure_bookkeeping(conn)?;
    let Some(_lock) = MigrationLock::try_acquire(conn)? else {
        return Err(CatalogError::Other(
            "Another migration is in progress. Wait and retry.".to_string(),
        ));
    };

    let pending = pending_migrations(conn)?;
    for migration in &pending {
        apply(conn, migration)?;
    }
    Ok(pending.len())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    tracing::info!(
        version = migration.version,
        description = migration.description,
        "Applying migration"
    );

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).map_err(|e| {
        CatalogError::Other(format!("Migration {} failed: {}", migration.version, e))
    })?;
    for addition in migration.add_columns {
        add_column(&tx, addition)?;
    }
    tx.execute(
        "INSERT INTO schema_migrations (version, description, applied_at)
         VALUES (?1, ?2, datetime('now'))",
        params![migration.version, migration.description],
    )?;
    tx.commit()?;

    tracing::info!(version = migration.version, "Migration applied");
    Ok(())
}

/// Applied migrations, oldest first.
pub fn get_migration_history(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    ensure_bookkeeping(conn)?;
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at FROM schema_migrations ORDER BY version",
    )?;
    let history = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                description: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(history)
}
