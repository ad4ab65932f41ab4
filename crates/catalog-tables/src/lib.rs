//! Table repository for the tessera catalog.
//!
//! The [`TableRepository`] owns a SQLite connection and exposes the table
//! lifecycle (create, PUT, PATCH, read with a field projection, soft delete,
//! version history) plus the side stores hanging off a table: join
//! statistics, sample data, profiles, profiler config, usage, location,
//! queries, custom metrics and the data model.
//!
//! Every mutating operation runs inside a single transaction. Validation
//! happens before the first write, so a failing call leaves nothing behind.
//!
//! # Example
//!
//! ```no_run
//! use tessera_catalog_core::{CatalogEntity, Column, ColumnDataType, DatabaseService, Table};
//! use tessera_catalog_storage::LocalSqliteBackend;
//! use tessera_catalog_tables::{Fields, RepositoryConfig, TableRepository};
//!
//! # fn main() -> tessera_catalog_core::Result<()> {
//! let backend = LocalSqliteBackend::new("catalog.db");
//! let mut repo = TableRepository::open(&backend, RepositoryConfig::default())?;
//!
//! let service = repo.register_service(DatabaseService::new("warehouse", "Postgres"), None)?;
//! let database = repo.register_database("analytics", service.id, None)?;
//! let schema = repo.register_schema("public", database.id, None)?;
//!
//! let table = Table::new("orders", schema.entity_reference())
//!     .with_columns(vec![Column::new("id", ColumnDataType::Bigint)]);
//! let created = repo.create_table(table, Some("alice"))?;
//! let _shown = repo.get(created.id, &Fields::parse("owner,tags")?, Default::default())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod fields;
pub mod joins;
pub mod patch;
pub mod repository;
pub mod store;
pub mod updater;

pub use config::{Clock, RepositoryConfig, RepositoryConfigBuilder};
pub use fields::{Field, Fields};
pub use repository::TableRepository;
pub use updater::{ChangeSet, Operation, TableUpdater, UpdateOutcome};
