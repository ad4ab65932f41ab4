//! Change descriptions recorded for each entity version.

use serde::{Deserialize, Serialize};

/// One field-level delta. Nested fields use dotted names, e.g.
/// `columns.address.description`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
}

/// Everything that changed between two versions of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeDescription {
    #[serde(default)]
    pub fields_added: Vec<FieldChange>,
    #[serde(default)]
    pub fields_updated: Vec<FieldChange>,
    #[serde(default)]
    pub fields_deleted: Vec<FieldChange>,
    pub previous_version: f64,
}

impl ChangeDescription {
    pub fn is_empty(&self) -> bool {
        self.fields_added.is_empty()
            && self.fields_updated.is_empty()
            && self.fields_deleted.is_empty()
    }

    /// Names of every touched field, in recording order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields_added
            .iter()
            .chain(&self.fields_updated)
            .chain(&self.fields_deleted)
            .map(|c| c.name.as_str())
    }
}

/// Version following `current`: a major change moves to the next whole
/// number, a minor change adds 0.1.
pub fn next_version(current: f64, major: bool) -> f64 {
    let next = if major {
        current.floor() + 1.0
    } else {
        current + 0.1
    };
    (next * 10.0).round() / 10.0
}
