//! Read-side assembly of a stored table.
//!
//! The stored document holds only what the table owns. Everything derived
//! from relationships or side stores is filled in here, and only for the
//! fields the caller asked for; every other derived field is cleared.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use tessera_catalog_core::{
    entity_type, CatalogEntity, CatalogError, ColumnProfile, CustomMetric, DatabaseSchema,
    DatabaseService, EntityReference, Include, Location, Relationship, Result, SqlQuery, Table,
    TableData, TableProfile, TableProfilerConfig, UsageSummary, User,
};
use tessera_catalog_storage::dao::{entity, extension, relationship, tag, time_series};
use uuid::Uuid;

use super::prepare::walk_columns_mut;
use super::{
    custom_metrics_extension, sort_queries, COLUMN_PROFILE_EXTENSION, PROFILER_CONFIG_EXTENSION,
    SAMPLE_DATA_EXTENSION, TABLE_PROFILE_EXTENSION, TABLE_QUERIES_EXTENSION,
    USAGE_SUMMARY_EXTENSION,
};
use crate::fields::{Field, Fields};
use crate::{joins, store};

fn parse_json<T: DeserializeOwned>(json: Option<String>) -> Result<Option<T>> {
    json.map(|j| serde_json::from_str(&j))
        .transpose()
        .map_err(Into::into)
}

/// Populate the requested fields of `table` and clear the rest.
pub(crate) fn set_fields(
    conn: &Connection,
    table: &mut Table,
    fields: &Fields,
    today: NaiveDate,
) -> Result<()> {
    set_containers(conn, table)?;
    table.href = None;

    table.change_description = match entity::get_version(conn, table.id, table.version) {
        Ok(version) => version
            .change_description
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        Err(CatalogError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    if !fields.contains(Field::TableConstraints) {
        table.table_constraints = None;
    }
    if !fields.contains(Field::ViewDefinition) {
        table.view_definition = None;
    }

    table.owner = if fields.contains(Field::Owner) {
        get_owner(conn, table.id)?
    } else {
        None
    };

    if fields.contains(Field::Tags) {
        populate_tags(conn, table)?;
    } else {
        table.tags = None;
        walk_columns_mut(&mut table.columns, |column| {
            column.tags = None;
            Ok(())
        })?;
    }

    table.usage_summary = if fields.contains(Field::UsageSummary) {
        parse_json::<UsageSummary>(time_series::latest(
            conn,
            table.fqn(),
            USAGE_SUMMARY_EXTENSION,
        )?)?
    } else {
        None
    };

    table.joins = if fields.contains(Field::Joins) {
        Some(joins::get_joins(conn, table.fqn(), today)?)
    } else {
        None
    };

    table.sample_data = if fields.contains(Field::SampleData) {
        parse_json::<TableData>(extension::get_extension(
            conn,
            table.id,
            SAMPLE_DATA_EXTENSION,
        )?)?
    } else {
        None
    };

    populate_profiles(conn, table, fields.contains(Field::Profile))?;

    table.table_profiler_config = if fields.contains(Field::TableProfilerConfig) {
        get_profiler_config(conn, table.id)?
    } else {
        None
    };

    table.location = if fields.contains(Field::Location) {
        get_location(conn, table.id)?
    } else {
        None
    };

    table.table_queries = if fields.contains(Field::TableQueries) {
        Some(get_queries(conn, table.id)?)
    } else {
        None
    };

    populate_custom_metrics(conn, table, fields.contains(Field::CustomMetrics))?;

    tracing::debug!(table = %table.fqn(), "Projected table");
    Ok(())
}

/// Rebuild schema, database and service references from the CONTAINS
/// relationship instead of trusting the stored copy.
fn set_containers(conn: &Connection, table: &mut Table) -> Result<()> {
    let Some(parent) =
        relationship::find_from(conn, table.id, Relationship::Contains, entity_type::DATABASE_SCHEMA)?
            .into_iter()
            .next()
    else {
        return Ok(());
    };

    let schema: DatabaseSchema =
        store::load(conn, entity_type::DATABASE_SCHEMA, parent.id, Include::All)?;
    let service: DatabaseService =
        store::load(conn, entity_type::DATABASE_SERVICE, schema.service.id, Include::All)?;
    table.database_schema = Some(schema.entity_reference());
    table.database = Some(schema.database);
    table.service = Some(service.entity_reference());
    table.service_type = Some(service.service_type);
    Ok(())
}

pub(crate) fn get_owner(conn: &Connection, table_id: Uuid) -> Result<Option<EntityReference>> {
    let Some(owner) = relationship::find_from(conn, table_id, Relationship::Owns, entity_type::USER)?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let user: User = store::load(conn, entity_type::USER, owner.id, Include::All)?;
    Ok(Some(user.entity_reference()))
}

/// Table and column tags, read from the tag store.
pub(crate) fn populate_tags(conn: &Connection, table: &mut Table) -> Result<()> {
    let labels = tag::get_tags(conn, table.fqn())?;
    table.tags = (!labels.is_empty()).then_some(labels);
    walk_columns_mut(&mut table.columns, |column| {
        let labels = tag::get_tags(conn, column.fqn())?;
        column.tags = (!labels.is_empty()).then_some(labels);
        Ok(())
    })
}

/// Owner and tags of the stored table, the state an update diffs against.
pub(crate) fn hydrate_for_update(conn: &Connection, table: &mut Table) -> Result<()> {
    table.owner = get_owner(conn, table.id)?;
    populate_tags(conn, table)
}

fn populate_profiles(conn: &Connection, table: &mut Table, requested: bool) -> Result<()> {
    if !requested {
        table.profile = None;
        for column in &mut table.columns {
            column.profile = None;
        }
        return Ok(());
    }

    table.profile = parse_json::<TableProfile>(time_series::latest(
        conn,
        table.fqn(),
        TABLE_PROFILE_EXTENSION,
    )?)?;
    for column in &mut table.columns {
        column.profile = parse_json::<ColumnProfile>(time_series::latest(
            conn,
            column.fqn(),
            COLUMN_PROFILE_EXTENSION,
        )?)?;
    }
    Ok(())
}

pub(crate) fn get_profiler_config(
    conn: &Connection,
    table_id: Uuid,
) -> Result<Option<TableProfilerConfig>> {
    parse_json(extension::get_extension(
        conn,
        table_id,
        PROFILER_CONFIG_EXTENSION,
    )?)
}

pub(crate) fn get_location(conn: &Connection, table_id: Uuid) -> Result<Option<EntityReference>> {
    let Some(location) = relationship::find_to(conn, table_id, Relationship::Has, entity_type::LOCATION)?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    let location: Location = store::load(conn, entity_type::LOCATION, location.id, Include::All)?;
    Ok(Some(location.entity_reference()))
}

/// Stored queries, highest vote first.
pub(crate) fn get_queries(conn: &Connection, table_id: Uuid) -> Result<Vec<SqlQuery>> {
    let mut queries: Vec<SqlQuery> =
        parse_json(extension::get_extension(conn, table_id, TABLE_QUERIES_EXTENSION)?)?
            .unwrap_or_default();
    sort_queries(&mut queries);
    Ok(queries)
}

pub(crate) fn get_custom_metrics(
    conn: &Connection,
    table_id: Uuid,
    column_name: &str,
) -> Result<Vec<CustomMetric>> {
    Ok(parse_json(extension::get_extension(
        conn,
        table_id,
        &custom_metrics_extension(column_name),
    )?)?
    .unwrap_or_default())
}

fn populate_custom_metrics(conn: &Connection, table: &mut Table, requested: bool) -> Result<()> {
    let table_id = table.id;
    for column in &mut table.columns {
        column.custom_metrics = if requested {
            let metrics = get_custom_metrics(conn, table_id, &column.name)?;
            (!metrics.is_empty()).then_some(metrics)
        } else {
            None
        };
    }
    Ok(())
}
