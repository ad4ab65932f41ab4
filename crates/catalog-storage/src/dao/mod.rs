//! Data access for the catalog tables.
//!
//! Every function takes a plain `&Connection`, so callers can pass either a
//! connection or an open `rusqlite::Transaction` (which derefs to one). No
//! function here commits or begins a transaction on its own.

pub mod entity;
pub mod extension;
pub mod field_relationship;
pub mod relationship;
pub mod tag;
pub mod time_series;

use tessera_catalog_core::CatalogError;
use uuid::Uuid;

/// Map a constraint violation to `Conflict`, anything else to `Sqlite`.
pub(crate) fn map_constraint(err: rusqlite::Error, what: impl FnOnce() -> String) -> CatalogError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CatalogError::Conflict(what())
        }
        _ => CatalogError::Sqlite(err),
    }
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, CatalogError> {
    Uuid::parse_str(raw)
        .map_err(|e| CatalogError::Other(format!("Corrupt entity id {}: {}", raw, e)))
}

#[cfg(test)]
pub(crate) fn test_connection() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    tessera_catalog_core::init_catalog(&conn, true).unwrap();
    conn
}
