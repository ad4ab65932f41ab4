//! Timestamped facts keyed by (FQN, extension, timestamp).
//!
//! A second write at the same timestamp replaces the first, which is how
//! re-running a profiler for the same instant stays idempotent.

use rusqlite::{params, Connection, OptionalExtension};
use tessera_catalog_core::Result;

pub fn upsert_at(
    conn: &Connection,
    entity_fqn: &str,
    extension: &str,
    json_schema: &str,
    json: &str,
    timestamp: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO entity_extension_time_series (entity_fqn, extension, json_schema, json, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (entity_fqn, extension, timestamp)
        DO UPDATE SET json_schema = excluded.json_schema, json = excluded.json
        "#,
        params![entity_fqn, extension, json_schema, json, timestamp],
    )?;
    Ok(())
}

pub fn get_at(
    conn: &Connection,
    entity_fqn: &str,
    extension: &str,
    timestamp: i64,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            r#"
            SELECT json FROM entity_extension_time_series
            WHERE entity_fqn = ?1 AND extension = ?2 AND timestamp = ?3
            "#,
            params![entity_fqn, extension, timestamp],
            |row| row.get(0),
        )
        .optional()?)
}

/// Entry with the greatest timestamp.
pub fn latest(conn: &Connection, entity_fqn: &str, extension: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            r#"
            SELECT json FROM entity_extension_time_series
            WHERE entity_fqn = ?1 AND extension = ?2
            ORDER BY timestamp DESC LIMIT 1
            "#,
            params![entity_fqn, extension],
            |row| row.get(0),
        )
        .optional()?)
}

/// Entries with `start_ts <= timestamp <= end_ts`, oldest first.
pub fn list_between(
    conn: &Connection,
    entity_fqn: &str,
    extension: &str,
    start_ts: i64,
    end_ts: i64,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT json FROM entity_extension_time_series
        WHERE entity_fqn = ?1 AND extension = ?2 AND timestamp >= ?3 AND timestamp <= ?4
        ORDER BY timestamp
        "#,
    )?;
    let rows = stmt
        .query_map(params![entity_fqn, extension, start_ts, end_ts], |row| {
            row.get(0)
        })?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}

/// Returns the number of rows removed.
pub fn delete_at(
    conn: &Connection,
    entity_fqn: &str,
    extension: &str,
    timestamp: i64,
) -> Result<usize> {
    Ok(conn.execute(
        r#"
        DELETE FROM entity_extension_time_series
        WHERE entity_fqn = ?1 AND extension = ?2 AND timestamp = ?3
        "#,
        params![entity_fqn, extension, timestamp],
    )?)
}
