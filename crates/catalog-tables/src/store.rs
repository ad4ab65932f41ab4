//! Typed access to stored entity documents.

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tessera_catalog_core::{entity_type, CatalogEntity, Include, Result, Table};
use tessera_catalog_storage::dao::entity::{self, EntityMeta};
use uuid::Uuid;

pub fn load<T: DeserializeOwned>(
    conn: &Connection,
    entity_type: &str,
    id: Uuid,
    include: Include,
) -> Result<T> {
    let json = entity::get_entity_json(conn, entity_type, id, include)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn load_by_fqn<T: DeserializeOwned>(
    conn: &Connection,
    entity_type: &str,
    fqn: &str,
    include: Include,
) -> Result<T> {
    let json = entity::get_entity_json_by_fqn(conn, entity_type, fqn, include)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn load_table(conn: &Connection, id: Uuid, include: Include) -> Result<Table> {
    load(conn, entity_type::TABLE, id, include)
}

pub fn load_table_by_fqn(conn: &Connection, fqn: &str, include: Include) -> Result<Table> {
    load_by_fqn(conn, entity_type::TABLE, fqn, include)
}

/// Insert a container/user/location document.
pub fn insert_entity<T: CatalogEntity + Serialize>(
    conn: &Connection,
    entity: &T,
    updated_by: &str,
) -> Result<()> {
    let json = serde_json::to_string(entity)?;
    entity::insert_entity(
        conn,
        &EntityMeta {
            id: entity.id(),
            entity_type: T::ENTITY_TYPE,
            name: entity.name(),
            fqn: entity.fqn(),
            version: tessera_catalog_core::INITIAL_VERSION,
            updated_at: chrono::Utc::now(),
            updated_by,
        },
        &json,
    )
}

/// Metadata row for a table document.
pub fn table_meta(table: &Table) -> EntityMeta<'_> {
    EntityMeta {
        id: table.id,
        entity_type: entity_type::TABLE,
        name: &table.name,
        fqn: table.fqn(),
        version: table.version,
        updated_at: table.updated_at,
        updated_by: &table.updated_by,
    }
}

/// Store a table document, stripped of derived fields.
pub fn store_table(conn: &Connection, table: &Table, update: bool) -> Result<()> {
    let json = serde_json::to_string(&table.storable())?;
    let meta = table_meta(table);
    if update {
        entity::update_entity(conn, &meta, &json)
    } else {
        entity::insert_entity(conn, &meta, &json)
    }
}
