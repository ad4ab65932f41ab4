//! Tessera Catalog Storage
//!
//! SQLite storage for the tessera catalog: a backend that locates and opens
//! the catalog file, and the data-access functions in [`dao`] that the
//! repositories run inside their transactions.

pub mod dao;

use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use tessera_catalog_core::{init_catalog, CatalogError, Result};

/// Convenience alias for trait objects.
pub type DynCatalogBackend = dyn CatalogBackend;

/// Storage backend trait
///
/// A backend knows where the catalog lives and hands out connections with
/// the schema initialized and migrated.
pub trait CatalogBackend: Send + Sync {
    /// Open a connection to the catalog, creating and migrating the schema
    /// if needed.
    fn get_connection(&self) -> Result<Connection>;

    /// Check if the catalog exists
    fn exists(&self) -> Result<bool>;

    /// Create a new catalog. Fails if one already exists.
    fn initialize(&self) -> Result<()>;
}

/// Parsed representation of a catalog URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Local(PathBuf),
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogLocation::Local(path) => write!(f, "file://{}", path.display()),
        }
    }
}

/// Parse a catalog URI into a structured location.
///
/// Accepts `file://` URIs and raw paths. Only `file://` paths are checked
/// for traversal, so relative raw paths keep working in development.
pub fn parse_catalog_uri(uri: &str) -> Result<CatalogLocation> {
    if let Some((scheme, _)) = uri.split_once("://") {
        if scheme != "file" {
            return Err(CatalogError::InvalidArgument(format!(
                "Unsupported catalog URI scheme {}://",
                scheme
            )));
        }
    }

    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if uri.starts_with("file://") {
        tessera_catalog_core::validation::validate_file_uri_path(path)?;
    }

    Ok(CatalogLocation::Local(PathBuf::from(path)))
}

/// Build a backend from a catalog URI.
pub fn backend_from_uri(uri: &str) -> Result<Box<DynCatalogBackend>> {
    match parse_catalog_uri(uri)? {
        CatalogLocation::Local(path) => Ok(Box::new(LocalSqliteBackend::new(path))),
    }
}

/// Apply the connection settings every catalog connection uses.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Local filesystem SQLite backend
#[derive(Clone, Debug)]
pub struct LocalSqliteBackend {
    path: PathBuf,
}

impl LocalSqliteBackend {
    /// # Example
    /// ```no_run
    /// use tessera_catalog_storage::LocalSqliteBackend;
    ///
    /// let backend = LocalSqliteBackend::new("catalog.db");
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        configure_connection(&conn)?;
        let applied = init_catalog(&conn, true)?;
        if applied > 0 {
            tracing::info!(path = %self.path.display(), applied, "Catalog schema migrated");
        }
        Ok(conn)
    }
}

impl CatalogBackend for LocalSqliteBackend {
    fn get_connection(&self) -> Result<Connection> {
        self.open()
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn initialize(&self) -> Result<()> {
        if self.path.exists() {
            return Err(CatalogError::Conflict(format!(
                "Catalog already exists at {}",
                self.path.display()
            )));
        }
        self.open()?;
        tracing::info!(path = %self.path.display(), "Initialized catalog");
        Ok(())
    }
}
