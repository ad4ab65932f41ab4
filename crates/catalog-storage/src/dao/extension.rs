//! Key/value facts attached to an entity id.

use rusqlite::{params, Connection, OptionalExtension};
use tessera_catalog_core::Result;
use uuid::Uuid;

pub fn upsert_extension(
    conn: &Connection,
    id: Uuid,
    extension: &str,
    json_schema: &str,
    json: &str,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO entity_extension (id, extension, json_schema, json)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (id, extension) DO UPDATE SET json_schema = excluded.json_schema, json = excluded.json
        "#,
        params![id.to_string(), extension, json_schema, json],
    )?;
    tracing::debug!(%id, extension, "Stored extension");
    Ok(())
}

pub fn get_extension(conn: &Connection, id: Uuid, extension: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT json FROM entity_extension WHERE id = ?1 AND extension = ?2",
            params![id.to_string(), extension],
            |row| row.get(0),
        )
        .optional()?)
}

/// Returns the number of rows removed (0 or 1).
pub fn delete_extension(conn: &Connection, id: Uuid, extension: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM entity_extension WHERE id = ?1 AND extension = ?2",
        params![id.to_string(), extension],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::test_connection;

    #[test]
    fn test_upsert_get_delete() {
        let conn = test_connection();
        let id = Uuid::new_v4();

        assert_eq!(get_extension(&conn, id, "table.sampleData").unwrap(), None);
        upsert_extension(&conn, id, "table.sampleData", "tableData", "1").unwrap();
        upsert_extension(&conn, id, "table.sampleData", "tableData", "2").unwrap();
        assert_eq!(
            get_extension(&conn, id, "table.sampleData").unwrap().as_deref(),
            Some("2")
        );

        // Keys are scoped per entity
        assert_eq!(get_extension(&conn, Uuid::new_v4(), "table.sampleData").unwrap(), None);

        assert_eq!(delete_extension(&conn, id, "table.sampleData").unwrap(), 1);
        assert_eq!(delete_extension(&conn, id, "table.sampleData").unwrap(), 0);
    }
}
