//! Read-side analytics attached to tables: join statistics, profiles,
//! sample data, queries, custom metrics and usage.
//!
//! None of these are part of the stored table document. They live in the
//! field-relationship and extension stores and are assembled on read.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::table::EntityReference;

/// Counter for a single calendar day (`yyyy-MM-dd`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

impl DailyCount {
    pub fn new(date: impl Into<String>, count: i64) -> Self {
        Self {
            date: date.into(),
            count,
        }
    }
}

/// Join count against another table or column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedWith {
    pub fully_qualified_name: String,
    pub join_count: i64,
}

impl JoinedWith {
    pub fn new(fully_qualified_name: impl Into<String>, join_count: i64) -> Self {
        Self {
            fully_qualified_name: fully_qualified_name.into(),
            join_count,
        }
    }
}

/// Joins observed for one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnJoin {
    /// Column name relative to the table
    pub column_name: String,
    pub joined_with: Vec<JoinedWith>,
}

/// Join statistics for a table.
///
/// On write, `start_date` is the day the counts were observed. On read it is
/// always today minus the window and `day_count` is the window length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableJoins {
    pub start_date: String,
    #[serde(default = "default_day_count")]
    pub day_count: i32,
    #[serde(default)]
    pub column_joins: Vec<ColumnJoin>,
    #[serde(default)]
    pub direct_table_joins: Vec<JoinedWith>,
}

fn default_day_count() -> i32 {
    1
}

/// Sample rows, one value per declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Table-level profile snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    /// Epoch milliseconds; identity within the time series
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_sample: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_in_byte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date_time: Option<String>,
}

/// Column-level profile snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_proportion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_proportion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
}

/// Request body for recording a profiler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableProfile {
    pub table_profile: TableProfile,
    #[serde(default)]
    pub column_profile: Vec<ColumnProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfilerConfig {
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
}

/// Which columns and metrics the profiler should compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfilerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_sample: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_columns: Option<Vec<ColumnProfilerConfig>>,
}

/// User-defined metric over one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMetric {
    /// Assigned on first insert, then preserved across updates by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub column_name: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityReference>,
}

/// A query seen against a table. Identity is the MD5 checksum of `query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub users: Vec<EntityReference>,
}

impl SqlQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            checksum: None,
            vote: None,
            query_date: None,
            duration: None,
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile_rank: Option<f64>,
}

/// Usage counters for a table as of `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub date: String,
    pub daily_stats: UsageStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_stats: Option<UsageStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_stats: Option<UsageStats>,
}
