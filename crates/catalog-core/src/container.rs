//! Entities that tables hang off or point at: services, databases, schemas,
//! users and storage locations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fqn;
use crate::table::{entity_type, EntityReference};

/// Common accessors used by the generic entity store.
pub trait CatalogEntity {
    const ENTITY_TYPE: &'static str;

    fn id(&self) -> Uuid;
    fn name(&self) -> &str;
    fn fqn(&self) -> &str;
    fn display_name(&self) -> Option<&str> {
        None
    }

    fn entity_reference(&self) -> EntityReference {
        EntityReference {
            id: self.id(),
            entity_type: Self::ENTITY_TYPE.to_string(),
            name: self.name().to_string(),
            fully_qualified_name: Some(self.fqn().to_string()),
            display_name: self.display_name().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseService {
    pub id: Uuid,
    pub name: String,
    /// FQN of a service is its quoted name
    pub fully_qualified_name: String,
    /// e.g. `Postgres`, `Snowflake`
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DatabaseService {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            fully_qualified_name: fqn::quote_name(&name),
            name,
            service_type: service_type.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: Uuid,
    pub name: String,
    pub fully_qualified_name: String,
    pub service: EntityReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub id: Uuid,
    pub name: String,
    pub fully_qualified_name: String,
    pub database: EntityReference,
    pub service: EntityReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: None,
            is_bot: false,
        }
    }
}

/// Storage location (bucket, prefix, ...) a table's data lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub fully_qualified_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub service: EntityReference,
}

impl CatalogEntity for DatabaseService {
    const ENTITY_TYPE: &'static str = entity_type::DATABASE_SERVICE;

    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn fqn(&self) -> &str {
        &self.fully_qualified_name
    }
}

impl CatalogEntity for Database {
    const ENTITY_TYPE: &'static str = entity_type::DATABASE;

    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn fqn(&self) -> &str {
        &self.fully_qualified_name
    }
}

impl CatalogEntity for DatabaseSchema {
    const ENTITY_TYPE: &'static str = entity_type::DATABASE_SCHEMA;

    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn fqn(&self) -> &str {
        &self.fully_qualified_name
    }
}

impl CatalogEntity for User {
    const ENTITY_TYPE: &'static str = entity_type::USER;

    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    /// Users are addressed by their plain name.
    fn fqn(&self) -> &str {
        &self.name
    }
    fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

impl CatalogEntity for Location {
    const ENTITY_TYPE: &'static str = entity_type::LOCATION;

    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn fqn(&self) -> &str {
        &self.fully_qualified_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_fqn_is_quoted_name() {
        let service = DatabaseService::new("prod.pg", "Postgres");
        assert_eq!(service.fully_qualified_name, "\"prod.pg\"");

        let reference = service.entity_reference();
        assert_eq!(reference.entity_type, "databaseService");
        assert_eq!(reference.fully_qualified_name.as_deref(), Some("\"prod.pg\""));
    }

    #[test]
    fn test_user_reference_carries_display_name() {
        let mut user = User::new("alice");
        user.display_name = Some("Alice".to_string());
        let reference = user.entity_reference();
        assert_eq!(reference.entity_type, "user");
        assert_eq!(reference.display_name.as_deref(), Some("Alice"));
    }
}
