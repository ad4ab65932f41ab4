//! Side stores attached to a table: join statistics, sample data, profiles
//! and profiler config, usage, location, queries, custom metrics and the
//! data model.

use chrono::{NaiveTime, Utc};
use md5::{Digest, Md5};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use tessera_catalog_core::validation::validate_join_start_date;
use tessera_catalog_core::{
    daily_count, entity_type, CatalogEntity, CatalogError, ColumnProfile, CreateTableProfile,
    CustomMetric, DataModel, Include, Location, Relationship, Result, SqlQuery, Table, TableData,
    TableJoins, TableProfile, TableProfilerConfig, UsageSummary,
};
use tessera_catalog_storage::dao::{extension, relationship, time_series};
use uuid::Uuid;

use super::projection::{self, get_custom_metrics, get_queries};
use super::{
    custom_metrics_extension, is_bot, prepare, read_table, sort_queries, store_update,
    TableRepository, COLUMN_PROFILE_EXTENSION, PROFILER_CONFIG_EXTENSION, SAMPLE_DATA_EXTENSION,
    TABLE_PROFILE_EXTENSION, TABLE_QUERIES_EXTENSION, USAGE_SUMMARY_EXTENSION,
};
use crate::fields::{Field, Fields};
use crate::joins;
use crate::store;
use crate::updater::{Operation, TableUpdater};

const TABLE_DATA_SCHEMA: &str = "tableData";
const TABLE_PROFILE_SCHEMA: &str = "tableProfile";
const COLUMN_PROFILE_SCHEMA: &str = "columnProfile";
const PROFILER_CONFIG_SCHEMA: &str = "tableProfilerConfig";
const SQL_QUERY_SCHEMA: &str = "sqlQuery";
const CUSTOM_METRIC_SCHEMA: &str = "customMetric";
const USAGE_SUMMARY_SCHEMA: &str = "usageSummary";

/// MD5 of the raw query text, hex encoded.
pub fn query_checksum(query: &str) -> String {
    hex::encode(Md5::digest(query.as_bytes()))
}

fn invalid_column(name: &str) -> CatalogError {
    CatalogError::InvalidArgument(format!("Invalid column name {}", name))
}

fn require_column(table: &Table, name: &str) -> Result<()> {
    table.column(name).map(|_| ()).ok_or_else(|| invalid_column(name))
}

/// Timestamp of the start of `date` (UTC), in milliseconds.
fn date_timestamp(date: &str) -> Result<i64> {
    let day = daily_count::parse_date(date)?;
    Ok(day.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

impl TableRepository {
    /// Record join observations for a table and return it with the fresh
    /// join statistics.
    ///
    /// Every column and target is checked before any edge is written.
    pub fn add_joins(&mut self, table_id: Uuid, joins: &TableJoins) -> Result<Table> {
        let today = self.config.today();
        validate_join_start_date(&joins.start_date, today)?;

        let tx = self.conn.transaction()?;
        let table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        joins::validate_joins(&tx, &table, joins)?;
        joins::store_joins(&tx, today, &table, joins)?;

        let result = read_table(
            &tx,
            table_id,
            &Fields::none().with(Field::Joins),
            Include::NonDeleted,
            today,
        )?;
        tx.commit()?;

        tracing::info!(
            table = %table.fqn(),
            column_joins = joins.column_joins.len(),
            direct_joins = joins.direct_table_joins.len(),
            "Recorded joins"
        );
        Ok(result)
    }

    /// Replace the sample data of a table.
    pub fn add_sample_data(&mut self, table_id: Uuid, data: TableData) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;

        for column in &data.columns {
            require_column(&table, column)?;
        }
        for (index, row) in data.rows.iter().enumerate() {
            if row.len() != data.columns.len() {
                return Err(CatalogError::InvalidArgument(format!(
                    "Number of columns is {} but row {} has {} sample values",
                    data.columns.len(),
                    index,
                    row.len()
                )));
            }
        }

        let json = serde_json::to_string(&data)?;
        extension::upsert_extension(&tx, table_id, SAMPLE_DATA_EXTENSION, TABLE_DATA_SCHEMA, &json)?;
        tx.commit()?;

        tracing::info!(table = %table.fqn(), rows = data.rows.len(), "Stored sample data");
        table.sample_data = Some(data);
        Ok(table)
    }

    pub fn add_table_profiler_config(
        &mut self,
        table_id: Uuid,
        config: TableProfilerConfig,
    ) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;

        for name in config.exclude_columns.iter().flatten() {
            require_column(&table, name)?;
        }
        for include in config.include_columns.iter().flatten() {
            require_column(&table, &include.column_name)?;
        }
        if let Some(sample) = config.profile_sample {
            if !(0.0..=100.0).contains(&sample) {
                return Err(CatalogError::InvalidArgument(format!(
                    "Profile sample {} must be between 0 and 100",
                    sample
                )));
            }
        }

        let json = serde_json::to_string(&config)?;
        extension::upsert_extension(
            &tx,
            table_id,
            PROFILER_CONFIG_EXTENSION,
            PROFILER_CONFIG_SCHEMA,
            &json,
        )?;
        tx.commit()?;

        table.table_profiler_config = Some(config);
        Ok(table)
    }

    pub fn delete_table_profiler_config(&mut self, table_id: Uuid) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        extension::delete_extension(&tx, table_id, PROFILER_CONFIG_EXTENSION)?;
        tx.commit()?;

        table.table_profiler_config = None;
        Ok(table)
    }

    /// Store a table profile and its column profiles. A profile at a
    /// timestamp that already has one replaces it.
    pub fn add_table_profile_data(
        &mut self,
        table_id: Uuid,
        profile: CreateTableProfile,
    ) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;

        for column_profile in &profile.column_profile {
            require_column(&table, &column_profile.name)?;
        }

        let json = serde_json::to_string(&profile.table_profile)?;
        time_series::upsert_at(
            &tx,
            table.fqn(),
            TABLE_PROFILE_EXTENSION,
            TABLE_PROFILE_SCHEMA,
            &json,
            profile.table_profile.timestamp,
        )?;

        for column_profile in &profile.column_profile {
            let Some(column) = table.columns.iter_mut().find(|c| c.name == column_profile.name)
            else {
                continue;
            };
            let json = serde_json::to_string(column_profile)?;
            time_series::upsert_at(
                &tx,
                column.fqn(),
                COLUMN_PROFILE_EXTENSION,
                COLUMN_PROFILE_SCHEMA,
                &json,
                column_profile.timestamp,
            )?;
            column.profile = Some(column_profile.clone());
        }
        tx.commit()?;

        tracing::info!(
            table = %table.fqn(),
            timestamp = profile.table_profile.timestamp,
            columns = profile.column_profile.len(),
            "Stored profile"
        );
        table.profile = Some(profile.table_profile);
        Ok(table)
    }

    /// Delete the table or column profile stored at exactly `timestamp`.
    ///
    /// `entity_type` is `"table"` (with a table FQN) or `"column"` (with a
    /// column FQN).
    pub fn delete_table_profile(
        &mut self,
        fqn: &str,
        entity_type: &str,
        timestamp: i64,
    ) -> Result<()> {
        let key = if entity_type.eq_ignore_ascii_case("table") {
            TABLE_PROFILE_EXTENSION
        } else if entity_type.eq_ignore_ascii_case("column") {
            COLUMN_PROFILE_EXTENSION
        } else {
            return Err(CatalogError::InvalidArgument(format!(
                "entityType must be table or column, got {}",
                entity_type
            )));
        };

        let tx = self.conn.transaction()?;
        if time_series::get_at(&tx, fqn, key, timestamp)?.is_none() {
            return Err(CatalogError::NotFound(format!(
                "Failed to find {} profile for {} at {}",
                entity_type, fqn, timestamp
            )));
        }
        time_series::delete_at(&tx, fqn, key, timestamp)?;
        tx.commit()?;

        tracing::info!(fqn, entity_type, timestamp, "Deleted profile");
        Ok(())
    }

    /// Table profiles with `start_ts <= timestamp <= end_ts`, oldest first.
    pub fn list_table_profiles(
        &self,
        table_fqn: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TableProfile>> {
        store::load_table_by_fqn(&self.conn, table_fqn, Include::NonDeleted)?;
        list_profiles(&self.conn, table_fqn, TABLE_PROFILE_EXTENSION, start_ts, end_ts)
    }

    /// Column profiles with `start_ts <= timestamp <= end_ts`, oldest first.
    pub fn list_column_profiles(
        &self,
        column_fqn: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<ColumnProfile>> {
        let table_fqn = tessera_catalog_core::fqn::get_table_fqn(column_fqn)?;
        store::load_table_by_fqn(&self.conn, &table_fqn, Include::NonDeleted)?;
        list_profiles(&self.conn, column_fqn, COLUMN_PROFILE_EXTENSION, start_ts, end_ts)
    }

    /// Store the usage summary for the day it reports.
    pub fn add_usage_summary(&mut self, table_id: Uuid, usage: UsageSummary) -> Result<Table> {
        let timestamp = date_timestamp(&usage.date)?;

        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        let json = serde_json::to_string(&usage)?;
        time_series::upsert_at(
            &tx,
            table.fqn(),
            USAGE_SUMMARY_EXTENSION,
            USAGE_SUMMARY_SCHEMA,
            &json,
            timestamp,
        )?;
        tx.commit()?;

        table.usage_summary = Some(usage);
        Ok(table)
    }

    /// Point the table at a location, replacing any previous one.
    pub fn add_location(&mut self, table_id: Uuid, location_id: Uuid) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        let location: Location =
            store::load(&tx, entity_type::LOCATION, location_id, Include::NonDeleted)?;

        relationship::delete_to(&tx, table_id, Relationship::Has, entity_type::LOCATION)?;
        relationship::add_relationship(
            &tx,
            table_id,
            location_id,
            entity_type::TABLE,
            entity_type::LOCATION,
            Relationship::Has,
        )?;
        tx.commit()?;

        tracing::info!(table = %table.fqn(), location = %location.fully_qualified_name, "Set location");
        table.location = Some(location.entity_reference());
        Ok(table)
    }

    pub fn delete_location(&mut self, table_id: Uuid) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        relationship::delete_to(&tx, table_id, Relationship::Has, entity_type::LOCATION)?;
        tx.commit()?;

        table.location = None;
        Ok(table)
    }

    /// Add a query seen against the table. A query with the same text is
    /// replaced, keeping the users of both.
    pub fn add_query(&mut self, table_id: Uuid, mut query: SqlQuery) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;

        let checksum = query_checksum(&query.query);
        query.checksum = Some(checksum.clone());

        let mut queries = get_queries(&tx, table_id)?;
        match queries
            .iter_mut()
            .find(|q| q.checksum.as_deref() == Some(checksum.as_str()))
        {
            Some(stored) => {
                let mut users = std::mem::take(&mut stored.users);
                for user in query.users.drain(..) {
                    if !users.iter().any(|u| u.id == user.id) {
                        users.push(user);
                    }
                }
                query.users = users;
                *stored = query;
            }
            None => queries.push(query),
        }
        sort_queries(&mut queries);

        let json = serde_json::to_string(&queries)?;
        extension::upsert_extension(&tx, table_id, TABLE_QUERIES_EXTENSION, SQL_QUERY_SCHEMA, &json)?;
        tx.commit()?;

        tracing::info!(table = %table.fqn(), checksum = %checksum, "Stored query");
        table.table_queries = Some(queries);
        Ok(table)
    }

    /// Add or replace (by name) a custom metric on one column. Replacing
    /// keeps the metric's id. Returns the table with only that metric.
    pub fn add_custom_metric(&mut self, table_id: Uuid, mut metric: CustomMetric) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        require_column(&table, &metric.column_name)?;

        let mut metrics = get_custom_metrics(&tx, table_id, &metric.column_name)?;
        match metrics.iter_mut().find(|m| m.name == metric.name) {
            Some(stored) => {
                metric.id = stored.id.or(metric.id);
                *stored = metric.clone();
            }
            None => {
                metric.id = metric.id.or_else(|| Some(Uuid::new_v4()));
                metrics.push(metric.clone());
            }
        }

        let json = serde_json::to_string(&metrics)?;
        extension::upsert_extension(
            &tx,
            table_id,
            &custom_metrics_extension(&metric.column_name),
            CUSTOM_METRIC_SCHEMA,
            &json,
        )?;
        tx.commit()?;

        tracing::info!(table = %table.fqn(), column = %metric.column_name, metric = %metric.name, "Stored custom metric");
        set_single_metric(&mut table, metric);
        Ok(table)
    }

    /// Remove a custom metric by name. Returns the table with the removed
    /// metric on its column.
    pub fn delete_custom_metric(
        &mut self,
        table_id: Uuid,
        column_name: &str,
        metric_name: &str,
    ) -> Result<Table> {
        let tx = self.conn.transaction()?;
        let mut table = store::load_table(&tx, table_id, Include::NonDeleted)?;
        require_column(&table, column_name)?;

        let mut metrics = get_custom_metrics(&tx, table_id, column_name)?;
        let Some(index) = metrics.iter().position(|m| m.name == metric_name) else {
            return Err(CatalogError::NotFound(format!(
                "Failed to find custom metric {} for column {}",
                metric_name, column_name
            )));
        };
        let removed = metrics.remove(index);

        let key = custom_metrics_extension(column_name);
        if metrics.is_empty() {
            extension::delete_extension(&tx, table_id, &key)?;
        } else {
            let json = serde_json::to_string(&metrics)?;
            extension::upsert_extension(&tx, table_id, &key, CUSTOM_METRIC_SCHEMA, &json)?;
        }
        tx.commit()?;

        tracing::info!(table = %table.fqn(), column = column_name, metric = metric_name, "Deleted custom metric");
        set_single_metric(&mut table, removed);
        Ok(table)
    }

    /// Attach a data model and propagate its owner (if the table has none)
    /// and its tags (table level and per matching column). Column
    /// descriptions are left alone.
    pub fn add_data_model(
        &mut self,
        table_id: Uuid,
        model: DataModel,
        updated_by: Option<&str>,
    ) -> Result<Table> {
        let actor = self.actor(updated_by);
        let today = self.config.today();
        let tx = self.conn.transaction()?;

        let mut original = store::load_table(&tx, table_id, Include::NonDeleted)?;
        projection::hydrate_for_update(&tx, &mut original)?;

        let mut updated = original.clone();
        updated.updated_at = Utc::now();
        updated.updated_by = actor.clone();
        if updated.owner.is_none() {
            if let Some(owner) = &model.owner {
                updated.owner = Some(prepare::resolve_owner(&tx, owner)?);
            }
        }
        updated.tags = model.tags.clone();
        for model_column in &model.columns {
            if let Some(column) = updated.columns.iter_mut().find(|c| c.name == model_column.name) {
                column.tags = model_column.tags.clone();
            }
        }
        prepare::prepare_tags(&tx, &mut updated)?;
        updated.data_model = Some(model);

        let by_bot = is_bot(&tx, &self.config, &actor)?;
        let outcome =
            TableUpdater::new(&tx, &original, &mut updated, Operation::Patch, by_bot).update()?;
        if outcome.changed() {
            store_update(&tx, &original, &updated)?;
        }

        let result = read_table(
            &tx,
            table_id,
            &Fields::none().with(Field::Owner).with(Field::Tags),
            Include::NonDeleted,
            today,
        )?;
        tx.commit()?;
        Ok(result)
    }
}

fn list_profiles<T: DeserializeOwned>(
    conn: &Connection,
    fqn: &str,
    key: &str,
    start_ts: i64,
    end_ts: i64,
) -> Result<Vec<T>> {
    time_series::list_between(conn, fqn, key, start_ts, end_ts)?
        .iter()
        .map(|json| serde_json::from_str(json).map_err(Into::into))
        .collect()
}

/// Put `metric` on its column as the only custom metric shown.
fn set_single_metric(table: &mut Table, metric: CustomMetric) {
    if let Some(column) = table.columns.iter_mut().find(|c| c.name == metric.column_name) {
        column.custom_metrics = Some(vec![metric]);
    }
}
