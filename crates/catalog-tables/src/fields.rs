//! Field projection for table reads.
//!
//! Derived fields are only assembled when a caller asks for them. Fields
//! that were not requested are cleared on the returned table, so callers
//! must not read "absent" as "unchanged".

use std::collections::BTreeSet;
use std::fmt;

use tessera_catalog_core::{CatalogError, Result};

/// One optional table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    TableConstraints,
    Owner,
    Tags,
    UsageSummary,
    Joins,
    SampleData,
    ViewDefinition,
    Profile,
    TableProfilerConfig,
    Location,
    TableQueries,
    CustomMetrics,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::TableConstraints,
        Field::Owner,
        Field::Tags,
        Field::UsageSummary,
        Field::Joins,
        Field::SampleData,
        Field::ViewDefinition,
        Field::Profile,
        Field::TableProfilerConfig,
        Field::Location,
        Field::TableQueries,
        Field::CustomMetrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::TableConstraints => "tableConstraints",
            Field::Owner => "owner",
            Field::Tags => "tags",
            Field::UsageSummary => "usageSummary",
            Field::Joins => "joins",
            Field::SampleData => "sampleData",
            Field::ViewDefinition => "viewDefinition",
            Field::Profile => "profile",
            Field::TableProfilerConfig => "tableProfilerConfig",
            Field::Location => "location",
            Field::TableQueries => "tableQueries",
            Field::CustomMetrics => "customMetrics",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CatalogError::InvalidArgument(format!("Invalid field name {}", s)))
    }
}

/// A set of requested fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeSet<Field>);

impl Fields {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(Field::ALL.into_iter().collect())
    }

    /// Parse a comma separated list such as `"owner,tags,joins"`.
    /// Whitespace around names is ignored; an empty string requests nothing.
    pub fn parse(raw: &str) -> Result<Self> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains(&field)
    }

    pub fn with(mut self, field: Field) -> Self {
        self.0.insert(field);
        self
    }
}

impl FromIterator<Field> for Fields {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let fields = Fields::parse("owner, tags,joins").unwrap();
        assert!(fields.contains(Field::Owner));
        assert!(fields.contains(Field::Tags));
        assert!(fields.contains(Field::Joins));
        assert!(!fields.contains(Field::Profile));
    }

    #[test]
    fn test_parse_empty_requests_nothing() {
        assert_eq!(Fields::parse("").unwrap(), Fields::none());
        assert_eq!(Fields::parse(" , ").unwrap(), Fields::none());
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        let err = Fields::parse("owner,followers").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(msg) if msg.contains("followers")));
    }

    #[test]
    fn test_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!(Fields::all().contains(Field::CustomMetrics));
    }
}
