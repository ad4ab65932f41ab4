//! Table entity repository.
//!
//! Each public operation that writes opens one transaction on the owned
//! connection, validates its input, performs its writes and commits. An
//! error anywhere drops the transaction, which rolls everything back.

mod analytics;
mod prepare;
mod projection;
mod registry;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde_json::Value;
use tessera_catalog_core::{
    entity_type, next_version, CatalogError, Include, Result, SqlQuery, Table, User,
    INITIAL_VERSION,
};
use tessera_catalog_storage::dao::entity;
use tessera_catalog_storage::{configure_connection, CatalogBackend};
use uuid::Uuid;

use crate::config::RepositoryConfig;
use crate::fields::{Field, Fields};
use crate::patch::apply_merge_patch;
use crate::store;
use crate::updater::{ChangeSet, Operation, TableUpdater};

/// Latest table-level profile, time series keyed by table FQN.
pub const TABLE_PROFILE_EXTENSION: &str = "table.tableProfile";
/// Column profiles, time series keyed by column FQN.
pub const COLUMN_PROFILE_EXTENSION: &str = "table.columnProfile";
pub const SAMPLE_DATA_EXTENSION: &str = "table.sampleData";
pub const PROFILER_CONFIG_EXTENSION: &str = "table.tableProfilerConfig";
pub const TABLE_QUERIES_EXTENSION: &str = "table.tableQueries";
/// Usage summaries, time series keyed by table FQN.
pub const USAGE_SUMMARY_EXTENSION: &str = "table.usageSummary";

/// Extension key holding the custom metrics of one column.
pub fn custom_metrics_extension(column_name: &str) -> String {
    format!("table.column.{}.customMetrics", column_name)
}

/// Order queries by vote, highest first. Queries without a vote sort last;
/// ties are broken by checksum so the order is stable.
pub(crate) fn sort_queries(queries: &mut [SqlQuery]) {
    queries.sort_by(|a, b| {
        let by_vote = match (a.vote, b.vote) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        by_vote.then_with(|| a.checksum.cmp(&b.checksum))
    });
}

/// Fields owned by the request itself, returned from writes.
fn entity_fields() -> Fields {
    [
        Field::TableConstraints,
        Field::ViewDefinition,
        Field::Owner,
        Field::Tags,
    ]
    .into_iter()
    .collect()
}

fn read_table(
    conn: &Connection,
    id: Uuid,
    fields: &Fields,
    include: Include,
    today: NaiveDate,
) -> Result<Table> {
    let mut table = store::load_table(conn, id, include)?;
    projection::set_fields(conn, &mut table, fields, today)?;
    Ok(table)
}

/// Snapshot the table as the version it now carries.
fn record_version(conn: &Connection, table: &Table) -> Result<()> {
    let json = serde_json::to_string(&table.storable())?;
    let change = table
        .change_description
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    entity::insert_version(conn, &store::table_meta(table), &json, change.as_deref())
}

/// Whether `actor` is an automated actor: listed in the configuration or
/// registered as a bot user.
fn is_bot(conn: &Connection, config: &RepositoryConfig, actor: &str) -> Result<bool> {
    if config.is_bot(actor) {
        return Ok(true);
    }
    match store::load_by_fqn::<User>(conn, entity_type::USER, actor, Include::All) {
        Ok(user) => Ok(user.is_bot),
        Err(CatalogError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Store a prepared table for the first time.
fn insert_new(conn: &Connection, table: &mut Table, actor: &str) -> Result<()> {
    table.version = INITIAL_VERSION;
    table.updated_at = Utc::now();
    table.updated_by = actor.to_string();
    table.change_description = None;
    table.deleted = false;

    store::store_table(conn, table, false)?;
    prepare::store_relationships(conn, table)?;
    record_version(conn, table)?;
    tracing::info!(table = %table.fqn(), id = %table.id, "Created table");
    Ok(())
}

/// Persist the outcome of an update that changed something.
fn store_update(conn: &Connection, original: &Table, updated: &Table) -> Result<()> {
    store::store_table(conn, updated, true)?;
    if original.deleted != updated.deleted {
        entity::set_deleted(conn, entity_type::TABLE, updated.id, updated.deleted)?;
    }
    record_version(conn, updated)
}

/// Repository for table entities and their side stores.
pub struct TableRepository {
    conn: Connection,
    config: RepositoryConfig,
}

impl TableRepository {
    /// Wrap an initialized catalog connection.
    pub fn new(conn: Connection, config: RepositoryConfig) -> Result<Self> {
        config.validate()?;
        configure_connection(&conn)?;
        Ok(Self { conn, config })
    }

    /// Open a connection from `backend` and wrap it.
    pub fn open(backend: &dyn CatalogBackend, config: RepositoryConfig) -> Result<Self> {
        Self::new(backend.get_connection()?, config)
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn actor(&self, updated_by: Option<&str>) -> String {
        updated_by
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.config.default_updated_by)
            .to_string()
    }

    /// Create a table inside the schema referenced by `table.database_schema`.
    ///
    /// Fails with `Conflict` if a table with the same FQN exists.
    pub fn create_table(&mut self, mut table: Table, updated_by: Option<&str>) -> Result<Table> {
        let actor = self.actor(updated_by);
        let today = self.config.today();
        let tx = self.conn.transaction()?;

        prepare::prepare_table(&tx, &mut table)?;
        insert_new(&tx, &mut table, &actor)?;
        let created = read_table(&tx, table.id, &entity_fields(), Include::NonDeleted, today)?;

        tx.commit()?;
        Ok(created)
    }

    /// Full replacement keyed by FQN: creates the table if it does not exist.
    ///
    /// Tags and owner missing from the request are kept. When the actor is a
    /// bot, non-empty descriptions and display names are kept as well.
    pub fn create_or_update(&mut self, mut request: Table, updated_by: Option<&str>) -> Result<Table> {
        let actor = self.actor(updated_by);
        let today = self.config.today();
        let tx = self.conn.transaction()?;

        prepare::prepare_table(&tx, &mut request)?;
        let Some(id) = entity::find_id_by_fqn(&tx, entity_type::TABLE, request.fqn())? else {
            insert_new(&tx, &mut request, &actor)?;
            let created = read_table(&tx, request.id, &entity_fields(), Include::NonDeleted, today)?;
            tx.commit()?;
            return Ok(created);
        };

        let mut original = store::load_table(&tx, id, Include::All)?;
        projection::hydrate_for_update(&tx, &mut original)?;

        // A PUT addresses the table by name; identity and the data model
        // are not part of the request.
        request.id = original.id;
        request.data_model = original.data_model.clone();
        request.deleted = false;
        request.updated_at = Utc::now();
        request.updated_by = actor.clone();

        let by_bot = is_bot(&tx, &self.config, &actor)?;
        let outcome =
            TableUpdater::new(&tx, &original, &mut request, Operation::Put, by_bot).update()?;
        if outcome.changed() {
            store_update(&tx, &original, &request)?;
        }

        let updated = read_table(&tx, id, &entity_fields(), Include::NonDeleted, today)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Apply a JSON merge patch to a table.
    ///
    /// Identity, name, FQN and container references cannot be patched; any
    /// such change in the patch is ignored.
    pub fn patch(&mut self, id: Uuid, patch: &Value, updated_by: Option<&str>) -> Result<Table> {
        let actor = self.actor(updated_by);
        let today = self.config.today();
        let tx = self.conn.transaction()?;

        let mut original = store::load_table(&tx, id, Include::NonDeleted)?;
        projection::hydrate_for_update(&tx, &mut original)?;

        let mut document = serde_json::to_value(&original)?;
        apply_merge_patch(&mut document, patch);
        let mut updated: Table = serde_json::from_value(document)
            .map_err(|e| CatalogError::InvalidArgument(format!("Invalid patch: {}", e)))?;

        updated.id = original.id;
        updated.name = original.name.clone();
        updated.fully_qualified_name = original.fully_qualified_name.clone();
        updated.database_schema = original.database_schema.clone();
        updated.database = original.database.clone();
        updated.service = original.service.clone();
        updated.service_type = original.service_type.clone();
        updated.deleted = original.deleted;
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();

        prepare::assign_column_fqns(original.fqn(), &mut updated.columns)?;
        let owner_changed =
            updated.owner.as_ref().map(|o| o.id) != original.owner.as_ref().map(|o| o.id);
        if let (true, Some(owner)) = (owner_changed, &updated.owner) {
            updated.owner = Some(prepare::resolve_owner(&tx, owner)?);
        }
        prepare::prepare_tags(&tx, &mut updated)?;

        let by_bot = is_bot(&tx, &self.config, &actor)?;
        let outcome =
            TableUpdater::new(&tx, &original, &mut updated, Operation::Patch, by_bot).update()?;
        if outcome.changed() {
            store_update(&tx, &original, &updated)?;
        }

        let patched = read_table(&tx, id, &entity_fields(), Include::NonDeleted, today)?;
        tx.commit()?;
        Ok(patched)
    }

    /// Read a table with the requested fields populated.
    pub fn get(&self, id: Uuid, fields: &Fields, include: Include) -> Result<Table> {
        read_table(&self.conn, id, fields, include, self.config.today())
    }

    /// Read a table by FQN with the requested fields populated.
    pub fn get_by_name(&self, fqn: &str, fields: &Fields, include: Include) -> Result<Table> {
        let mut table = store::load_table_by_fqn(&self.conn, fqn, include)?;
        projection::set_fields(&self.conn, &mut table, fields, self.config.today())?;
        Ok(table)
    }

    /// All tables ordered by FQN.
    pub fn list(&self, fields: &Fields, include: Include) -> Result<Vec<Table>> {
        let today = self.config.today();
        entity::list_entities_json(&self.conn, entity_type::TABLE, include)?
            .iter()
            .map(|json| {
                let mut table: Table = serde_json::from_str(json)?;
                projection::set_fields(&self.conn, &mut table, fields, today)?;
                Ok(table)
            })
            .collect()
    }

    /// Soft delete. The table keeps its relationships and side stores and
    /// stays readable with [`Include::All`].
    pub fn delete(&mut self, id: Uuid, updated_by: Option<&str>) -> Result<Table> {
        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;

        let mut table = store::load_table(&tx, id, Include::NonDeleted)?;
        let previous = table.version;
        let mut changes = ChangeSet::default();
        changes.record_updated("deleted", Value::Bool(false), Value::Bool(true));

        table.deleted = true;
        table.version = next_version(previous, false);
        table.updated_at = Utc::now();
        table.updated_by = actor;
        table.change_description = Some(changes.into_description(previous));

        store::store_table(&tx, &table, true)?;
        entity::set_deleted(&tx, entity_type::TABLE, id, true)?;
        record_version(&tx, &table)?;
        tx.commit()?;

        tracing::info!(table = %table.fqn(), version = table.version, "Deleted table");
        Ok(table)
    }

    /// Every recorded version, newest first.
    pub fn list_versions(&self, id: Uuid) -> Result<Vec<Table>> {
        store::load_table(&self.conn, id, Include::All)?;
        entity::list_versions(&self.conn, id)?
            .into_iter()
            .map(version_to_table)
            .collect()
    }

    pub fn get_version(&self, id: Uuid, version: f64) -> Result<Table> {
        store::load_table(&self.conn, id, Include::All)?;
        version_to_table(entity::get_version(&self.conn, id, version)?)
    }
}

fn version_to_table(version: entity::EntityVersion) -> Result<Table> {
    let mut table: Table = serde_json::from_str(&version.json)?;
    table.version = version.version;
    table.change_description = version
        .change_description
        .map(|json| serde_json::from_str(&json))
        .transpose()?;
    Ok(table)
}
