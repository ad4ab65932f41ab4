//! Entity documents and their version history.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tessera_catalog_core::{CatalogError, Include, Result};
use uuid::Uuid;

use super::{map_constraint, parse_uuid};

/// Row metadata written next to each entity document.
#[derive(Debug, Clone)]
pub struct EntityMeta<'a> {
    pub id: Uuid,
    pub entity_type: &'a str,
    pub name: &'a str,
    pub fqn: &'a str,
    pub version: f64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: &'a str,
}

/// Snapshot of an earlier version of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVersion {
    pub version: f64,
    pub json: String,
    pub change_description: Option<String>,
}

fn deleted_clause(include: Include) -> &'static str {
    match include {
        Include::NonDeleted => " AND deleted = 0",
        Include::All => "",
    }
}

/// Insert a new entity. Fails with `Conflict` if the id or the
/// (type, FQN) pair is already taken.
pub fn insert_entity(conn: &Connection, meta: &EntityMeta<'_>, json: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO entities (id, entity_type, name, fqn, json, version, updated_at, updated_by)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            meta.id.to_string(),
            meta.entity_type,
            meta.name,
            meta.fqn,
            json,
            meta.version,
            meta.updated_at.to_rfc3339(),
            meta.updated_by,
        ],
    )
    .map_err(|e| {
        map_constraint(e, || {
            format!("Entity {} {} already exists", meta.entity_type, meta.fqn)
        })
    })?;

    tracing::debug!(
        id = %meta.id,
        entity_type = meta.entity_type,
        fqn = meta.fqn,
        "Inserted entity"
    );
    Ok(())
}

/// Replace the stored document of an existing entity.
pub fn update_entity(conn: &Connection, meta: &EntityMeta<'_>, json: &str) -> Result<()> {
    let rows = conn.execute(
        r#"
        UPDATE entities
        SET name = ?3, fqn = ?4, json = ?5, version = ?6, updated_at = ?7, updated_by = ?8
        WHERE id = ?1 AND entity_type = ?2
        "#,
        params![
            meta.id.to_string(),
            meta.entity_type,
            meta.name,
            meta.fqn,
            json,
            meta.version,
            meta.updated_at.to_rfc3339(),
            meta.updated_by,
        ],
    )?;

    if rows == 0 {
        return Err(CatalogError::entity_not_found(meta.entity_type, meta.id));
    }
    Ok(())
}

pub fn get_entity_json(
    conn: &Connection,
    entity_type: &str,
    id: Uuid,
    include: Include,
) -> Result<String> {
    let sql = format!(
        "SELECT json FROM entities WHERE id = ?1 AND entity_type = ?2{}",
        deleted_clause(include)
    );
    conn.query_row(&sql, params![id.to_string(), entity_type], |row| row.get(0))
        .optional()?
        .ok_or_else(|| CatalogError::entity_not_found(entity_type, id))
}

pub fn get_entity_json_by_fqn(
    conn: &Connection,
    entity_type: &str,
    fqn: &str,
    include: Include,
) -> Result<String> {
    let sql = format!(
        "SELECT json FROM entities WHERE fqn = ?1 AND entity_type = ?2{}",
        deleted_clause(include)
    );
    conn.query_row(&sql, params![fqn, entity_type], |row| row.get(0))
        .optional()?
        .ok_or_else(|| CatalogError::entity_not_found(entity_type, fqn))
}

/// Id of the entity with this FQN, deleted or not.
pub fn find_id_by_fqn(conn: &Connection, entity_type: &str, fqn: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT id FROM entities WHERE fqn = ?1 AND entity_type = ?2",
            params![fqn, entity_type],
            |row| row.get(0),
        )
        .optional()?;
    raw.as_deref().map(parse_uuid).transpose()
}

/// Entity type of the entity with this id, if any.
pub fn find_entity_type(conn: &Connection, id: Uuid) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT entity_type FROM entities WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn list_entities_json(
    conn: &Connection,
    entity_type: &str,
    include: Include,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT json FROM entities WHERE entity_type = ?1{} ORDER BY fqn",
        deleted_clause(include)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([entity_type], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(rows)
}

/// Flip the soft-delete flag.
pub fn set_deleted(conn: &Connection, entity_type: &str, id: Uuid, deleted: bool) -> Result<()> {
    let rows = conn.execute(
        "UPDATE entities SET deleted = ?3 WHERE id = ?1 AND entity_type = ?2",
        params![id.to_string(), entity_type, deleted],
    )?;
    if rows == 0 {
        return Err(CatalogError::entity_not_found(entity_type, id));
    }
    Ok(())
}

/// Record the document as it was at `version`.
pub fn insert_version(
    conn: &Connection,
    meta: &EntityMeta<'_>,
    json: &str,
    change_description: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entity_versions
            (id, entity_type, version, json, change_description, updated_at, updated_by)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            meta.id.to_string(),
            meta.entity_type,
            meta.version,
            json,
            change_description,
            meta.updated_at.to_rfc3339(),
            meta.updated_by,
        ],
    )?;
    Ok(())
}

/// All recorded versions, newest first.
pub fn list_versions(conn: &Connection, id: Uuid) -> Result<Vec<EntityVersion>> {
    let mut stmt = conn.prepare(
        "SELECT version, json, change_description FROM entity_versions WHERE id = ?1 ORDER BY version DESC",
    )?;
    let rows = stmt
        .query_map([id.to_string()], |row| {
            Ok(EntityVersion {
                version: row.get(0)?,
                json: row.get(1)?,
                change_description: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_version(conn: &Connection, id: Uuid, version: f64) -> Result<EntityVersion> {
    // Versions are stored with one decimal, compare with a tolerance
    conn.query_row(
        r#"
        SELECT version, json, change_description FROM entity_versions
        WHERE id = ?1 AND abs(version - ?2) < 0.001
        "#,
        params![id.to_string(), version],
        |row| {
            Ok(EntityVersion {
                version: row.get(0)?,
                json: row.get(1)?,
                change_description: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CatalogError::NotFound(format!("Version {} of entity {} not found", version, id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::test_connection;

    fn meta<'a>(id: Uuid, fqn: &'a str, version: f64) -> EntityMeta<'a> {
        EntityMeta {
            id,
            entity_type: "table",
            name: "orders",
            fqn,
            version,
            updated_at: Utc::now(),
            updated_by: "admin",
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_connection();
        let id = Uuid::new_v4();
        insert_entity(&conn, &meta(id, "svc.db.public.orders", 0.1), r#"{"a":1}"#).unwrap();

        assert_eq!(
            get_entity_json(&conn, "table", id, Include::NonDeleted).unwrap(),
            r#"{"a":1}"#
        );
        assert_eq!(
            get_entity_json_by_fqn(&conn, "table", "svc.db.public.orders", Include::NonDeleted)
                .unwrap(),
            r#"{"a":1}"#
        );
        assert_eq!(
            find_id_by_fqn(&conn, "table", "svc.db.public.orders").unwrap(),
            Some(id)
        );
        assert_eq!(find_entity_type(&conn, id).unwrap().as_deref(), Some("table"));
    }

    #[test]
    fn test_duplicate_fqn_is_conflict() {
        let conn = test_connection();
        insert_entity(&conn, &meta(Uuid::new_v4(), "svc.db.public.orders", 0.1), "{}").unwrap();
        let err = insert_entity(&conn, &meta(Uuid::new_v4(), "svc.db.public.orders", 0.1), "{}")
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn test_missing_entity_is_not_found() {
        let conn = test_connection();
        let err = get_entity_json(&conn, "table", Uuid::new_v4(), Include::All).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = update_entity(&conn, &meta(Uuid::new_v4(), "x.y.z.t", 0.2), "{}").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_soft_delete_visibility() {
        let conn = test_connection();
        let id = Uuid::new_v4();
        insert_entity(&conn, &meta(id, "svc.db.public.orders", 0.1), "{}").unwrap();
        set_deleted(&conn, "table", id, true).unwrap();

        assert!(get_entity_json(&conn, "table", id, Include::NonDeleted).is_err());
        assert!(get_entity_json(&conn, "table", id, Include::All).is_ok());
        assert!(list_entities_json(&conn, "table", Include::NonDeleted)
            .unwrap()
            .is_empty());
        assert_eq!(list_entities_json(&conn, "table", Include::All).unwrap().len(), 1);
    }

    #[test]
    fn test_versions_newest_first() {
        let conn = test_connection();
        let id = Uuid::new_v4();
        insert_version(&conn, &meta(id, "f", 0.1), r#"{"v":1}"#, None).unwrap();
        insert_version(&conn, &meta(id, "f", 0.2), r#"{"v":2}"#, Some("{}")).unwrap();

        let versions = list_versions(&conn, id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 0.2);
        assert_eq!(get_version(&conn, id, 0.1).unwrap().json, r#"{"v":1}"#);
        assert!(get_version(&conn, id, 3.0).is_err());
    }
}
