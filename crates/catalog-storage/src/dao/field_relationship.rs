//! Typed edges between fully-qualified names, each carrying a JSON payload.
//!
//! The catalog keeps join statistics here. Edges are unordered in meaning,
//! so lookups are bidirectional; callers decide which end is `from`.

use rusqlite::{params, Connection, OptionalExtension};
use tessera_catalog_core::{Relationship, Result};

/// One stored edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRelation {
    pub from_fqn: String,
    pub to_fqn: String,
    pub json: Option<String>,
}

/// Key of an edge, excluding the payload.
#[derive(Debug, Clone, Copy)]
pub struct FieldEdge<'a> {
    pub from_fqn: &'a str,
    pub to_fqn: &'a str,
    pub from_type: &'a str,
    pub to_type: &'a str,
    pub relation: Relationship,
}

/// Insert the edge or replace its payload.
pub fn upsert(conn: &Connection, edge: &FieldEdge<'_>, json_schema: &str, json: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO field_relationship (from_fqn, to_fqn, from_type, to_type, relation, json_schema, json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (from_fqn, to_fqn, from_type, to_type, relation)
        DO UPDATE SET json_schema = excluded.json_schema, json = excluded.json
        "#,
        params![
            edge.from_fqn,
            edge.to_fqn,
            edge.from_type,
            edge.to_type,
            edge.relation.ordinal(),
            json_schema,
            json
        ],
    )?;
    Ok(())
}

/// Payload of a single edge, if the edge exists.
pub fn find(conn: &Connection, edge: &FieldEdge<'_>) -> Result<Option<Option<String>>> {
    Ok(conn
        .query_row(
            r#"
            SELECT json FROM field_relationship
            WHERE from_fqn = ?1 AND to_fqn = ?2 AND from_type = ?3 AND to_type = ?4 AND relation = ?5
            "#,
            params![
                edge.from_fqn,
                edge.to_fqn,
                edge.from_type,
                edge.to_type,
                edge.relation.ordinal()
            ],
            |row| row.get(0),
        )
        .optional()?)
}

fn query_relations(
    conn: &Connection,
    sql: &str,
    fqn: &str,
    from_type: &str,
    to_type: &str,
    relation: Relationship,
) -> Result<Vec<FieldRelation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![fqn, from_type, to_type, relation.ordinal()], |row| {
            Ok(FieldRelation {
                from_fqn: row.get(0)?,
                to_fqn: row.get(1)?,
                json: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Edges where either end equals `fqn`.
pub fn list_bidirectional(
    conn: &Connection,
    fqn: &str,
    from_type: &str,
    to_type: &str,
    relation: Relationship,
) -> Result<Vec<FieldRelation>> {
    query_relations(
        conn,
        r#"
        SELECT from_fqn, to_fqn, json FROM field_relationship
        WHERE (from_fqn = ?1 OR to_fqn = ?1)
          AND from_type = ?2 AND to_type = ?3 AND relation = ?4
        ORDER BY from_fqn, to_fqn
        "#,
        fqn,
        from_type,
        to_type,
        relation,
    )
}

/// Edges where either end starts with `prefix`.
///
/// Prefixes are compared with `substr` rather than `LIKE` so that `_` and `%`
/// in names match literally.
pub fn list_bidirectional_prefix(
    conn: &Connection,
    prefix: &str,
    from_type: &str,
    to_type: &str,
    relation: Relationship,
) -> Result<Vec<FieldRelation>> {
    query_relations(
        conn,
        r#"
        SELECT from_fqn, to_fqn, json FROM field_relationship
        WHERE (substr(from_fqn, 1, length(?1)) = ?1 OR substr(to_fqn, 1, length(?1)) = ?1)
          AND from_type = ?2 AND to_type = ?3 AND relation = ?4
        ORDER BY from_fqn, to_fqn
        "#,
        prefix,
        from_type,
        to_type,
        relation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::test_connection;

    fn edge<'a>(from: &'a str, to: &'a str) -> FieldEdge<'a> {
        FieldEdge {
            from_fqn: from,
            to_fqn: to,
            from_type: "table.columns.column",
            to_type: "table.columns.column",
            relation: Relationship::JoinedWith,
        }
    }

    #[test]
    fn test_upsert_replaces_payload() {
        let conn = test_connection();
        let e = edge("a.b.c.t1.id", "a.b.c.t2.id");
        assert_eq!(find(&conn, &e).unwrap(), None);

        upsert(&conn, &e, "dailyCount", "[1]").unwrap();
        upsert(&conn, &e, "dailyCount", "[2]").unwrap();
        assert_eq!(find(&conn, &e).unwrap(), Some(Some("[2]".to_string())));
    }

    #[test]
    fn test_bidirectional_lookup() {
        let conn = test_connection();
        upsert(&conn, &edge("a.b.c.t1.id", "a.b.c.t2.id"), "s", "[]").unwrap();
        upsert(&conn, &edge("a.b.c.t0.id", "a.b.c.t1.ref"), "s", "[]").unwrap();
        upsert(&conn, &edge("a.b.c.t3.x", "a.b.c.t4.y"), "s", "[]").unwrap();

        let found = list_bidirectional_prefix(
            &conn,
            "a.b.c.t1.",
            "table.columns.column",
            "table.columns.column",
            Relationship::JoinedWith,
        )
        .unwrap();
        assert_eq!(found.len(), 2);

        let exact = list_bidirectional(
            &conn,
            "a.b.c.t1.id",
            "table.columns.column",
            "table.columns.column",
            Relationship::JoinedWith,
        )
        .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_prefix_matches_underscore_literally() {
        let conn = test_connection();
        upsert(&conn, &edge("a.b.c.t_1.id", "a.b.c.z.id"), "s", "[]").unwrap();
        upsert(&conn, &edge("a.b.c.tx1.id", "a.b.c.z.id"), "s", "[]").unwrap();

        let found = list_bidirectional_prefix(
            &conn,
            "a.b.c.t_1.",
            "table.columns.column",
            "table.columns.column",
            Relationship::JoinedWith,
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].from_fqn, "a.b.c.t_1.id");
    }
}
