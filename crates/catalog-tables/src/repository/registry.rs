//! Registration of the entities tables hang off or point at.

use tessera_catalog_core::validation::{validate_entity_name, validate_tag_fqn};
use tessera_catalog_core::{
    entity_type, fqn, CatalogEntity, Database, DatabaseSchema, DatabaseService, EntityReference,
    Include, Location, Relationship, Result, User,
};
use tessera_catalog_storage::dao::relationship;
use tessera_catalog_storage::dao::tag::{self, TagDefinition};
use uuid::Uuid;

use super::TableRepository;
use crate::store;

impl TableRepository {
    pub fn register_service(
        &mut self,
        mut service: DatabaseService,
        updated_by: Option<&str>,
    ) -> Result<DatabaseService> {
        validate_entity_name(&service.name, "Service name")?;
        service.fully_qualified_name = fqn::quote_name(&service.name);

        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;
        store::insert_entity(&tx, &service, &actor)?;
        tx.commit()?;

        tracing::info!(service = %service.fully_qualified_name, "Registered service");
        Ok(service)
    }

    pub fn register_database(
        &mut self,
        name: &str,
        service_id: Uuid,
        updated_by: Option<&str>,
    ) -> Result<Database> {
        validate_entity_name(name, "Database name")?;

        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;
        let service: DatabaseService = store::load(
            &tx,
            entity_type::DATABASE_SERVICE,
            service_id,
            Include::NonDeleted,
        )?;
        let database = Database {
            id: Uuid::new_v4(),
            name: name.to_string(),
            fully_qualified_name: fqn::add(&service.fully_qualified_name, name),
            service: service.entity_reference(),
            description: None,
        };
        store::insert_entity(&tx, &database, &actor)?;
        relationship::add_relationship(
            &tx,
            service.id,
            database.id,
            entity_type::DATABASE_SERVICE,
            entity_type::DATABASE,
            Relationship::Contains,
        )?;
        tx.commit()?;

        tracing::info!(database = %database.fully_qualified_name, "Registered database");
        Ok(database)
    }

    pub fn register_schema(
        &mut self,
        name: &str,
        database_id: Uuid,
        updated_by: Option<&str>,
    ) -> Result<DatabaseSchema> {
        validate_entity_name(name, "Schema name")?;

        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;
        let database: Database =
            store::load(&tx, entity_type::DATABASE, database_id, Include::NonDeleted)?;
        let schema = DatabaseSchema {
            id: Uuid::new_v4(),
            name: name.to_string(),
            fully_qualified_name: fqn::add(&database.fully_qualified_name, name),
            database: database.entity_reference(),
            service: database.service.clone(),
            description: None,
        };
        store::insert_entity(&tx, &schema, &actor)?;
        relationship::add_relationship(
            &tx,
            database.id,
            schema.id,
            entity_type::DATABASE,
            entity_type::DATABASE_SCHEMA,
            Relationship::Contains,
        )?;
        tx.commit()?;

        tracing::info!(schema = %schema.fully_qualified_name, "Registered schema");
        Ok(schema)
    }

    pub fn register_user(&mut self, user: User, updated_by: Option<&str>) -> Result<User> {
        validate_entity_name(&user.name, "User name")?;

        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;
        store::insert_entity(&tx, &user, &actor)?;
        tx.commit()?;

        tracing::info!(user = %user.name, bot = user.is_bot, "Registered user");
        Ok(user)
    }

    /// Reference to a registered, non-deleted user.
    pub fn get_user(&self, name: &str) -> Result<EntityReference> {
        let user: User = store::load_by_fqn(&self.conn, entity_type::USER, name, Include::NonDeleted)?;
        Ok(user.entity_reference())
    }

    /// Register a storage location under a service.
    pub fn register_location(
        &mut self,
        name: &str,
        path: Option<&str>,
        service_id: Uuid,
        updated_by: Option<&str>,
    ) -> Result<Location> {
        validate_entity_name(name, "Location name")?;

        let actor = self.actor(updated_by);
        let tx = self.conn.transaction()?;
        let service: DatabaseService = store::load(
            &tx,
            entity_type::DATABASE_SERVICE,
            service_id,
            Include::NonDeleted,
        )?;
        let location = Location {
            id: Uuid::new_v4(),
            name: name.to_string(),
            fully_qualified_name: fqn::add(&service.fully_qualified_name, name),
            path: path.map(str::to_string),
            service: service.entity_reference(),
        };
        store::insert_entity(&tx, &location, &actor)?;
        tx.commit()?;

        tracing::info!(location = %location.fully_qualified_name, "Registered location");
        Ok(location)
    }

    /// Define a tag. Associated tags must already exist; applying this tag
    /// later also applies them as derived labels.
    pub fn create_tag(
        &mut self,
        tag_fqn: &str,
        description: Option<&str>,
        associated_tags: &[&str],
    ) -> Result<TagDefinition> {
        validate_tag_fqn(tag_fqn)?;
        for associated in associated_tags {
            validate_tag_fqn(associated)?;
        }

        let tx = self.conn.transaction()?;
        for associated in associated_tags {
            tag::require_tag(&tx, associated)?;
        }
        let definition = TagDefinition {
            fqn: tag_fqn.to_string(),
            description: description.map(str::to_string),
            associated_tags: associated_tags.iter().map(|t| t.to_string()).collect(),
        };
        tag::create_tag(&tx, &definition)?;
        tx.commit()?;

        tracing::info!(tag = tag_fqn, "Created tag");
        Ok(definition)
    }
}
