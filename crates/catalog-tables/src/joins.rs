//! Join statistics.
//!
//! Each observed join between two tables (or two columns) is one undirected
//! edge in the field-relationship store. The lexicographically smaller FQN is
//! always stored as `from`, so recording a join from either side lands on the
//! same row. The edge payload is the [`DailyCount`] series for that pair,
//! trimmed to the rolling window on every write and summed on every read.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use tessera_catalog_core::daily_count::{self, WINDOW_DAYS};
use tessera_catalog_core::{
    fqn, CatalogError, ColumnJoin, DailyCount, Include, JoinedWith, Relationship, Result, Table,
    TableJoins,
};
use tessera_catalog_storage::dao::field_relationship::{self, FieldEdge, FieldRelation};

use crate::store;

/// Edge end type for column-level joins.
pub const COLUMN_FIELD_TYPE: &str = "table.columns.column";
/// Edge end type for table-level joins.
pub const TABLE_FIELD_TYPE: &str = "table";

const DAILY_COUNT_SCHEMA: &str = "dailyCount";

/// Order an undirected pair so the smaller FQN comes first.
pub fn canonicalize<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn parse_counts(json: Option<&str>) -> Result<Vec<DailyCount>> {
    match json {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(json)?),
        _ => Ok(Vec::new()),
    }
}

/// Merge one observation per joined entity into the edges of `local_fqn`.
pub fn add_joined_with(
    conn: &Connection,
    today: NaiveDate,
    local_fqn: &str,
    joined_with: &[JoinedWith],
    start_date: &str,
    field_type: &str,
) -> Result<()> {
    for joined in joined_with {
        let (from_fqn, to_fqn) = canonicalize(local_fqn, &joined.fully_qualified_name);
        let edge = FieldEdge {
            from_fqn,
            to_fqn,
            from_type: field_type,
            to_type: field_type,
            relation: Relationship::JoinedWith,
        };

        let existing = field_relationship::find(conn, &edge)?.flatten();
        let current = parse_counts(existing.as_deref())?;
        let merged = daily_count::aggregate_and_filter(
            &current,
            &DailyCount::new(start_date, joined.join_count),
            today,
        );

        let json = serde_json::to_string(&merged)?;
        field_relationship::upsert(conn, &edge, DAILY_COUNT_SCHEMA, &json)?;
        tracing::debug!(
            from = from_fqn,
            to = to_fqn,
            date = start_date,
            count = joined.join_count,
            entries = merged.len(),
            "Recorded join"
        );
    }
    Ok(())
}

/// Check every reference in `joins` before anything is written.
///
/// Local column names must exist on `table`; joined-with column FQNs must
/// name a column of an existing table; direct joins must name an existing
/// table. Unknown targets are reported as invalid arguments.
pub fn validate_joins(conn: &Connection, table: &Table, joins: &TableJoins) -> Result<()> {
    for column_join in &joins.column_joins {
        if table.column(&column_join.column_name).is_none() {
            return Err(CatalogError::InvalidArgument(format!(
                "Invalid column name {}",
                column_join.column_name
            )));
        }

        for joined in &column_join.joined_with {
            validate_join_count(joined)?;
            let target_fqn = fqn::get_table_fqn(&joined.fully_qualified_name)?;
            let target = load_join_target(conn, &target_fqn)?;
            let column_name = fqn::get_column_name(&joined.fully_qualified_name)?;
            if target.column(&column_name).is_none() {
                return Err(CatalogError::InvalidArgument(format!(
                    "Invalid fully qualified column name {}",
                    joined.fully_qualified_name
                )));
            }
        }
    }

    for joined in &joins.direct_table_joins {
        validate_join_count(joined)?;
        load_join_target(conn, &joined.fully_qualified_name)?;
    }

    Ok(())
}

fn validate_join_count(joined: &JoinedWith) -> Result<()> {
    if joined.join_count < 0 {
        return Err(CatalogError::InvalidArgument(format!(
            "Invalid join count {} for {}",
            joined.join_count, joined.fully_qualified_name
        )));
    }
    Ok(())
}

fn load_join_target(conn: &Connection, table_fqn: &str) -> Result<Table> {
    store::load_table_by_fqn(conn, table_fqn, Include::NonDeleted).map_err(|e| match e {
        CatalogError::NotFound(msg) => CatalogError::InvalidArgument(msg),
        other => other,
    })
}

/// Write all joins of an already validated request.
pub fn store_joins(
    conn: &Connection,
    today: NaiveDate,
    table: &Table,
    joins: &TableJoins,
) -> Result<()> {
    for column_join in &joins.column_joins {
        let local_fqn = table
            .column(&column_join.column_name)
            .and_then(|c| c.fully_qualified_name.clone())
            .unwrap_or_else(|| fqn::add(table.fqn(), &column_join.column_name));
        add_joined_with(
            conn,
            today,
            &local_fqn,
            &column_join.joined_with,
            &joins.start_date,
            COLUMN_FIELD_TYPE,
        )?;
    }

    add_joined_with(
        conn,
        today,
        table.fqn(),
        &joins.direct_table_joins,
        &joins.start_date,
        TABLE_FIELD_TYPE,
    )
}

/// End of `relation` that is not `local`. A self-edge returns `local`.
fn other_end<'a>(relation: &'a FieldRelation, local: &str) -> &'a str {
    if relation.from_fqn == local {
        &relation.to_fqn
    } else {
        &relation.from_fqn
    }
}

/// Aggregate join statistics for `table_fqn` over the window ending today.
///
/// Edges whose counts all fell out of the window are kept with a count of 0.
pub fn get_joins(conn: &Connection, table_fqn: &str, today: NaiveDate) -> Result<TableJoins> {
    let direct_table_joins = field_relationship::list_bidirectional(
        conn,
        table_fqn,
        TABLE_FIELD_TYPE,
        TABLE_FIELD_TYPE,
        Relationship::JoinedWith,
    )?
    .iter()
    .map(|relation| {
        let counts = parse_counts(relation.json.as_deref())?;
        Ok(JoinedWith::new(
            other_end(relation, table_fqn),
            daily_count::sum_in_window(&counts, today),
        ))
    })
    .collect::<Result<Vec<_>>>()?;

    let prefix = format!("{}{}", table_fqn, fqn::SEPARATOR);
    let column_edges = field_relationship::list_bidirectional_prefix(
        conn,
        &prefix,
        COLUMN_FIELD_TYPE,
        COLUMN_FIELD_TYPE,
        Relationship::JoinedWith,
    )?;

    // column name -> joined-with entries
    let mut by_column: BTreeMap<String, Vec<JoinedWith>> = BTreeMap::new();
    for relation in &column_edges {
        let count = daily_count::sum_in_window(&parse_counts(relation.json.as_deref())?, today);
        // Both ends may belong to this table (a self join), in which case the
        // edge is reported once per local column.
        let ends = [
            (&relation.from_fqn, &relation.to_fqn),
            (&relation.to_fqn, &relation.from_fqn),
        ];
        for (local, other) in ends {
            if !local.starts_with(&prefix) {
                continue;
            }
            let column_name = fqn::get_column_name(local)?;
            by_column
                .entry(column_name)
                .or_default()
                .push(JoinedWith::new(other.as_str(), count));
        }
    }

    let column_joins = by_column
        .into_iter()
        .map(|(column_name, mut joined_with)| {
            joined_with.sort_by(|a, b| a.fully_qualified_name.cmp(&b.fully_qualified_name));
            ColumnJoin {
                column_name,
                joined_with,
            }
        })
        .collect();

    Ok(TableJoins {
        start_date: daily_count::format_date(daily_count::window_start(today)),
        day_count: WINDOW_DAYS as i32,
        column_joins,
        direct_table_joins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Duration;

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("a.b", "a.c"), ("a.b", "a.c"));
        assert_eq!(canonicalize("a.c", "a.b"), ("a.b", "a.c"));
        assert_eq!(canonicalize("a.b", "a.b"), ("a.b", "a.b"));
    }

    #[test]
    fn test_either_direction_lands_on_one_edge() {
        let conn = test_connection();
        let today = fixed_today();
        let date = daily_count::format_date(today);
        let a = "svc.db.public.a.id";
        let b = "svc.db.public.b.id";

        add_joined_with(&conn, today, b, &[JoinedWith::new(a, 4)], &date, COLUMN_FIELD_TYPE)
            .unwrap();
        add_joined_with(&conn, today, a, &[JoinedWith::new(b, 4)], &date, COLUMN_FIELD_TYPE)
            .unwrap();

        let edges = field_relationship::list_bidirectional_prefix(
            &conn,
            "svc.db.public.",
            COLUMN_FIELD_TYPE,
            COLUMN_FIELD_TYPE,
            Relationship::JoinedWith,
        )
        .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_fqn, a);
        assert_eq!(edges[0].to_fqn, b);
        // Same date twice: last write wins, no summing
        let counts: Vec<DailyCount> =
            serde_json::from_str(edges[0].json.as_deref().unwrap()).unwrap();
        assert_eq!(counts, vec![DailyCount::new(&date, 4)]);
    }

    #[test]
    fn test_get_joins_groups_by_column_and_sums() {
        let conn = test_connection();
        let today = fixed_today();
        let day = |n: i64| daily_count::format_date(today - Duration::days(n));
        let local = "svc.db.public.orders.customer_id";
        let other = "svc.db.public.customers.id";

        for n in [1, 2, 45] {
            add_joined_with(
                &conn,
                today,
                local,
                &[JoinedWith::new(other, 10)],
                &day(n),
                COLUMN_FIELD_TYPE,
            )
            .unwrap();
        }

        let joins = get_joins(&conn, "svc.db.public.orders", today).unwrap();
        assert_eq!(joins.day_count, 30);
        assert_eq!(joins.start_date, day(30));
        assert_eq!(
            joins.column_joins,
            vec![ColumnJoin {
                column_name: "customer_id".to_string(),
                joined_with: vec![JoinedWith::new(other, 20)],
            }]
        );

        // Seen from the other table
        let reverse = get_joins(&conn, "svc.db.public.customers", today).unwrap();
        assert_eq!(reverse.column_joins[0].column_name, "id");
        assert_eq!(reverse.column_joins[0].joined_with, vec![JoinedWith::new(local, 20)]);
    }

    #[test]
    fn test_expired_edges_are_kept_with_zero() {
        let conn = test_connection();
        let today = fixed_today();
        let date = daily_count::format_date(today);
        add_joined_with(
            &conn,
            today,
            "svc.db.public.orders",
            &[JoinedWith::new("svc.db.public.customers", 3)],
            &date,
            TABLE_FIELD_TYPE,
        )
        .unwrap();

        let later = today + Duration::days(31);
        let joins = get_joins(&conn, "svc.db.public.orders", later).unwrap();
        assert_eq!(
            joins.direct_table_joins,
            vec![JoinedWith::new("svc.db.public.customers", 0)]
        );
    }

    #[test]
    fn test_prefix_does_not_leak_into_similar_table_names() {
        let conn = test_connection();
        let today = fixed_today();
        let date = daily_count::format_date(today);
        add_joined_with(
            &conn,
            today,
            "svc.db.public.orders_archive.id",
            &[JoinedWith::new("svc.db.public.z.id", 1)],
            &date,
            COLUMN_FIELD_TYPE,
        )
        .unwrap();

        let joins = get_joins(&conn, "svc.db.public.orders", today).unwrap();
        assert!(joins.column_joins.is_empty());
    }
}
