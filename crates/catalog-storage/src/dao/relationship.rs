//! Typed edges between entity ids.

use rusqlite::{params, Connection};
use tessera_catalog_core::{Relationship, Result};
use uuid::Uuid;

use super::parse_uuid;

/// The far end of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedEntity {
    pub id: Uuid,
    pub entity_type: String,
}

/// Add an edge. Adding an existing edge is a no-op.
pub fn add_relationship(
    conn: &Connection,
    from_id: Uuid,
    to_id: Uuid,
    from_entity: &str,
    to_entity: &str,
    relation: Relationship,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO entity_relationship (from_id, to_id, from_entity, to_entity, relation)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            from_id.to_string(),
            to_id.to_string(),
            from_entity,
            to_entity,
            relation.ordinal()
        ],
    )?;
    tracing::debug!(%from_id, %to_id, %relation, "Added relationship");
    Ok(())
}

fn collect_related(
    conn: &Connection,
    sql: &str,
    id: Uuid,
    relation: Relationship,
    entity_type: &str,
) -> Result<Vec<RelatedEntity>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(
            params![id.to_string(), relation.ordinal(), entity_type],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, entity_type)| {
            Ok(RelatedEntity {
                id: parse_uuid(&id)?,
                entity_type,
            })
        })
        .collect()
}

/// Targets of `relation` edges leaving `from_id`, restricted to `to_entity`.
pub fn find_to(
    conn: &Connection,
    from_id: Uuid,
    relation: Relationship,
    to_entity: &str,
) -> Result<Vec<RelatedEntity>> {
    collect_related(
        conn,
        r#"
        SELECT to_id, to_entity FROM entity_relationship
        WHERE from_id = ?1 AND relation = ?2 AND to_entity = ?3
        ORDER BY rowid
        "#,
        from_id,
        relation,
        to_entity,
    )
}

/// Sources of `relation` edges entering `to_id`, restricted to `from_entity`.
pub fn find_from(
    conn: &Connection,
    to_id: Uuid,
    relation: Relationship,
    from_entity: &str,
) -> Result<Vec<RelatedEntity>> {
    collect_related(
        conn,
        r#"
        SELECT from_id, from_entity FROM entity_relationship
        WHERE to_id = ?1 AND relation = ?2 AND from_entity = ?3
        ORDER BY rowid
        "#,
        to_id,
        relation,
        from_entity,
    )
}

/// Remove every `relation` edge from `from_id` to entities of `to_entity` type.
pub fn delete_to(
    conn: &Connection,
    from_id: Uuid,
    relation: Relationship,
    to_entity: &str,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM entity_relationship WHERE from_id = ?1 AND relation = ?2 AND to_entity = ?3",
        params![from_id.to_string(), relation.ordinal(), to_entity],
    )?)
}

/// Remove every `relation` edge into `to_id` from entities of `from_entity` type.
pub fn delete_from(
    conn: &Connection,
    to_id: Uuid,
    relation: Relationship,
    from_entity: &str,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM entity_relationship WHERE to_id = ?1 AND relation = ?2 AND from_entity = ?3",
        params![to_id.to_string(), relation.ordinal(), from_entity],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::test_connection;

    #[test]
    fn test_add_is_idempotent() {
        let conn = test_connection();
        let (schema, table) = (Uuid::new_v4(), Uuid::new_v4());
        for _ in 0..2 {
            add_relationship(
                &conn,
                schema,
                table,
                "databaseSchema",
                "table",
                Relationship::Contains,
            )
            .unwrap();
        }

        let children = find_to(&conn, schema, Relationship::Contains, "table").unwrap();
        assert_eq!(
            children,
            vec![RelatedEntity {
                id: table,
                entity_type: "table".to_string()
            }]
        );
        let parents = find_from(&conn, table, Relationship::Contains, "databaseSchema").unwrap();
        assert_eq!(parents[0].id, schema);
    }

    #[test]
    fn test_relation_kinds_are_separate() {
        let conn = test_connection();
        let (user, table) = (Uuid::new_v4(), Uuid::new_v4());
        add_relationship(&conn, user, table, "user", "table", Relationship::Owns).unwrap();

        assert!(find_to(&conn, user, Relationship::Contains, "table")
            .unwrap()
            .is_empty());
        assert_eq!(delete_from(&conn, table, Relationship::Owns, "team").unwrap(), 0);
        assert_eq!(delete_from(&conn, table, Relationship::Owns, "user").unwrap(), 1);
        assert!(find_from(&conn, table, Relationship::Owns, "user")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete_to() {
        let conn = test_connection();
        let (table, location) = (Uuid::new_v4(), Uuid::new_v4());
        add_relationship(&conn, table, location, "table", "location", Relationship::Has).unwrap();
        assert_eq!(delete_to(&conn, table, Relationship::Has, "location").unwrap(), 1);
        assert_eq!(delete_to(&conn, table, Relationship::Has, "location").unwrap(), 0);
    }
}
