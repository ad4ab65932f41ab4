//! Table entity model.
//!
//! A [`Table`] is persisted as a JSON document. Relationship-derived fields
//! (owner, tags, service, href) and read-side analytics (joins, profile,
//! sample data, queries, ...) are carried on the same struct but are stripped
//! before storage and rebuilt by the repository on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::{
    ColumnProfile, CustomMetric, SqlQuery, TableData, TableJoins, TableProfile,
    TableProfilerConfig, UsageSummary,
};
use crate::change::ChangeDescription;

/// Entity type names used by the entity and relationship stores.
pub mod entity_type {
    pub const TABLE: &str = "table";
    pub const DATABASE_SCHEMA: &str = "databaseSchema";
    pub const DATABASE: &str = "database";
    pub const DATABASE_SERVICE: &str = "databaseService";
    pub const USER: &str = "user";
    pub const LOCATION: &str = "location";
}

/// Lightweight pointer to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub id: Uuid,
    /// Entity type name (see [`entity_type`])
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Where a tag label comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagSource {
    Tag,
    Glossary,
}

/// How a tag label was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelType {
    Manual,
    Propagated,
    Automated,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagState {
    Suggested,
    Confirmed,
}

/// A tag applied to a table or column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLabel {
    pub tag_fqn: String,
    pub source: TagSource,
    pub label_type: LabelType,
    pub state: TagState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TagLabel {
    /// A manually applied, confirmed classification tag.
    pub fn manual(tag_fqn: impl Into<String>) -> Self {
        Self {
            tag_fqn: tag_fqn.into(),
            source: TagSource::Tag,
            label_type: LabelType::Manual,
            state: TagState::Confirmed,
            description: None,
        }
    }

    /// Two labels are the same tag when fqn and source agree.
    pub fn same_tag(&self, other: &TagLabel) -> bool {
        self.tag_fqn == other.tag_fqn && self.source == other.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Regular,
    External,
    View,
    SecureView,
    MaterializedView,
    Iceberg,
    Local,
    Partitioned,
    Foreign,
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TableType::Regular => "Regular",
            TableType::External => "External",
            TableType::View => "View",
            TableType::SecureView => "SecureView",
            TableType::MaterializedView => "MaterializedView",
            TableType::Iceberg => "Iceberg",
            TableType::Local => "Local",
            TableType::Partitioned => "Partitioned",
            TableType::Foreign => "Foreign",
        };
        write!(f, "{}", s)
    }
}

/// Column data types understood by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnDataType {
    Number,
    Tinyint,
    Smallint,
    Int,
    Bigint,
    Byteint,
    Bytes,
    Float,
    Double,
    Decimal,
    Numeric,
    Timestamp,
    Time,
    Date,
    Datetime,
    Interval,
    String,
    Mediumtext,
    Text,
    Char,
    Varchar,
    Boolean,
    Binary,
    Varbinary,
    Array,
    Blob,
    Longblob,
    Mediumblob,
    Map,
    Struct,
    Union,
    Set,
    Geography,
    Enum,
    Json,
    Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnConstraint {
    Null,
    NotNull,
    Unique,
    PrimaryKey,
}

/// A column, possibly with nested children for struct-like types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub data_type: ColumnDataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_data_type: Option<ColumnDataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type_display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagLabel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ColumnConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Column>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ColumnProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metrics: Option<Vec<CustomMetric>>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnDataType) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            data_type,
            array_data_type: None,
            data_length: None,
            precision: None,
            scale: None,
            data_type_display: None,
            description: None,
            fully_qualified_name: None,
            tags: None,
            constraint: None,
            ordinal_position: None,
            children: None,
            profile: None,
            custom_metrics: None,
        }
    }

    /// Identity used when diffing column lists: name, data type and ordinal
    /// position. The generated FQN is deliberately not part of it.
    pub fn same_identity(&self, other: &Column) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.ordinal_position == other.ordinal_position
    }

    /// Column FQN, empty if it was never assigned.
    pub fn fqn(&self) -> &str {
        self.fully_qualified_name.as_deref().unwrap_or_default()
    }

    /// Copy of this column tree without tags, profiles or custom metrics.
    pub fn stripped(&self) -> Column {
        Column {
            tags: None,
            profile: None,
            custom_metrics: None,
            children: self
                .children
                .as_ref()
                .map(|children| children.iter().map(Column::stripped).collect()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    Unique,
    PrimaryKey,
    ForeignKey,
}

/// Multi-column table constraint.
///
/// Ordering is by constraint type, then by column list, which is the
/// canonical key used when comparing constraint sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableConstraint {
    pub constraint_type: ConstraintType,
    pub columns: Vec<String>,
}

/// Model definition (e.g. dbt) attached to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    pub model_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagLabel>>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Table entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "initial_version")]
    pub version: f64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<TableType>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_constraints: Option<Vec<TableConstraint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model: Option<DataModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagLabel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_schema: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_summary: Option<UsageSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joins: Option<TableJoins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<TableProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_profiler_config: Option<TableProfilerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_queries: Option<Vec<SqlQuery>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_description: Option<ChangeDescription>,
    #[serde(default)]
    pub deleted: bool,
}

/// Version assigned to a freshly created entity.
pub const INITIAL_VERSION: f64 = 0.1;

fn initial_version() -> f64 {
    INITIAL_VERSION
}

impl Table {
    /// New table request inside the given schema. Identity, FQN and
    /// container references are assigned by the repository on create.
    pub fn new(name: impl Into<String>, database_schema: EntityReference) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: None,
            fully_qualified_name: None,
            description: None,
            version: INITIAL_VERSION,
            updated_at: Utc::now(),
            updated_by: String::new(),
            table_type: None,
            columns: Vec::new(),
            table_constraints: None,
            view_definition: None,
            data_model: None,
            owner: None,
            tags: None,
            service: None,
            service_type: None,
            database: None,
            database_schema: Some(database_schema),
            href: None,
            usage_summary: None,
            joins: None,
            sample_data: None,
            profile: None,
            table_profiler_config: None,
            location: None,
            table_queries: None,
            change_description: None,
            deleted: false,
        }
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn fqn(&self) -> &str {
        self.fully_qualified_name.as_deref().unwrap_or_default()
    }

    /// Reference to this table.
    pub fn entity_reference(&self) -> EntityReference {
        EntityReference {
            id: self.id,
            entity_type: entity_type::TABLE.to_string(),
            name: self.name.clone(),
            fully_qualified_name: self.fully_qualified_name.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Find a top-level column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The document that is actually persisted: relationship-derived and
    /// read-side fields removed, column tags stripped.
    pub fn storable(&self) -> Table {
        Table {
            owner: None,
            tags: None,
            service: None,
            href: None,
            usage_summary: None,
            joins: None,
            sample_data: None,
            profile: None,
            table_profiler_config: None,
            location: None,
            table_queries: None,
            change_description: None,
            columns: self.columns.iter().map(Column::stripped).collect(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_ref() -> EntityReference {
        EntityReference {
            id: Uuid::new_v4(),
            entity_type: entity_type::DATABASE_SCHEMA.to_string(),
            name: "public".to_string(),
            fully_qualified_name: Some("svc.db.public".to_string()),
            display_name: None,
        }
    }

    #[test]
    fn test_column_identity_ignores_fqn() {
        let mut a = Column::new("id", ColumnDataType::Bigint);
        a.ordinal_position = Some(1);
        a.fully_qualified_name = Some("a.b.c.t.id".to_string());
        let mut b = a.clone();
        b.fully_qualified_name = Some("x.y.z.t.id".to_string());
        b.description = Some("changed".to_string());
        assert!(a.same_identity(&b));

        b.ordinal_position = Some(2);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_storable_strips_derived_fields() {
        let mut column = Column::new("payload", ColumnDataType::Struct);
        column.tags = Some(vec![TagLabel::manual("PII.Sensitive")]);
        let mut child = Column::new("email", ColumnDataType::Varchar);
        child.tags = Some(vec![TagLabel::manual("PII.Sensitive")]);
        column.children = Some(vec![child]);

        let mut table = Table::new("orders", schema_ref()).with_columns(vec![column]);
        table.tags = Some(vec![TagLabel::manual("Tier.Tier1")]);
        table.href = Some("http://localhost/tables/orders".to_string());

        let stored = table.storable();
        assert!(stored.tags.is_none());
        assert!(stored.href.is_none());
        assert!(stored.columns[0].tags.is_none());
        assert!(stored.columns[0].children.as_ref().unwrap()[0].tags.is_none());
        // The original is untouched
        assert!(table.columns[0].tags.is_some());
    }

    #[test]
    fn test_constraint_ordering() {
        let pk = TableConstraint {
            constraint_type: ConstraintType::PrimaryKey,
            columns: vec!["id".to_string()],
        };
        let unique = TableConstraint {
            constraint_type: ConstraintType::Unique,
            columns: vec!["email".to_string()],
        };
        let mut list = vec![pk.clone(), unique.clone()];
        list.sort();
        assert_eq!(list, vec![unique, pk]);
    }

    #[test]
    fn test_table_serializes_type_field() {
        let json = serde_json::to_value(schema_ref()).unwrap();
        assert_eq!(json["type"], "databaseSchema");
    }
}
