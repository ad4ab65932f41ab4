//! Request preparation: everything a table needs before it is stored.
//!
//! Container references are resolved from the schema, FQNs are assigned to
//! the table and its whole column tree, owners are checked, and tag labels
//! are validated and expanded with their associated (derived) tags.

use std::collections::HashSet;

use rusqlite::Connection;
use tessera_catalog_core::validation::{validate_column_name, validate_entity_name};
use tessera_catalog_core::{
    entity_type, fqn, CatalogEntity, CatalogError, Column, DatabaseSchema, DatabaseService,
    EntityReference, Include, LabelType, Relationship, Result, Table, TagLabel, TagSource,
    TagState, User,
};
use tessera_catalog_storage::dao::{relationship, tag};

use crate::store;

/// Visit every column of a tree, parents before children, in declaration
/// order.
pub(crate) fn walk_columns_mut<F>(columns: &mut [Column], mut visit: F) -> Result<()>
where
    F: FnMut(&mut Column) -> Result<()>,
{
    let mut pending: Vec<&mut Column> = columns.iter_mut().rev().collect();
    while let Some(column) = pending.pop() {
        visit(column)?;
        if let Some(children) = column.children.as_mut() {
            pending.extend(children.iter_mut().rev());
        }
    }
    Ok(())
}

/// Read-only counterpart of [`walk_columns_mut`].
pub(crate) fn walk_columns<F>(columns: &[Column], mut visit: F) -> Result<()>
where
    F: FnMut(&Column) -> Result<()>,
{
    let mut pending: Vec<&Column> = columns.iter().rev().collect();
    while let Some(column) = pending.pop() {
        visit(column)?;
        pending.extend(column.children.iter().flatten().rev());
    }
    Ok(())
}

/// Give every column in the tree an FQN under its parent.
///
/// Sibling columns must have distinct names; a repeated name would give two
/// columns the same FQN.
pub(crate) fn assign_column_fqns(table_fqn: &str, columns: &mut [Column]) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending: Vec<(String, &mut Column)> = columns
        .iter_mut()
        .map(|c| (table_fqn.to_string(), c))
        .collect();

    while let Some((parent, column)) = pending.pop() {
        validate_column_name(&column.name)?;
        let column_fqn = fqn::add(&parent, &column.name);
        if !seen.insert(column_fqn.clone()) {
            return Err(CatalogError::InvalidArgument(format!(
                "Duplicate column name {} under {}",
                column.name, parent
            )));
        }
        column.fully_qualified_name = Some(column_fqn.clone());
        if let Some(children) = column.children.as_mut() {
            pending.extend(children.iter_mut().map(|c| (column_fqn.clone(), c)));
        }
    }
    Ok(())
}

/// Check the owner exists and return a complete reference to it.
pub(crate) fn resolve_owner(conn: &Connection, owner: &EntityReference) -> Result<EntityReference> {
    if owner.entity_type != entity_type::USER {
        return Err(CatalogError::InvalidArgument(format!(
            "Invalid owner type {}",
            owner.entity_type
        )));
    }
    let user: User = store::load(conn, entity_type::USER, owner.id, Include::NonDeleted)?;
    Ok(user.entity_reference())
}

/// Validate labels and append each label's associated tags as derived
/// labels. Labels already present are not duplicated.
pub(crate) fn add_derived_tags(
    conn: &Connection,
    labels: Option<Vec<TagLabel>>,
) -> Result<Option<Vec<TagLabel>>> {
    let Some(labels) = labels else {
        return Ok(None);
    };

    let mut expanded: Vec<TagLabel> = Vec::with_capacity(labels.len());
    for mut label in labels {
        let definition = tag::require_tag(conn, &label.tag_fqn)?;
        if label.description.is_none() {
            label.description = definition.description.clone();
        }
        if !expanded.iter().any(|l| l.same_tag(&label)) {
            expanded.push(label);
        }

        for associated in &definition.associated_tags {
            let derived = TagLabel {
                tag_fqn: associated.clone(),
                source: TagSource::Tag,
                label_type: LabelType::Derived,
                state: TagState::Confirmed,
                description: tag::get_tag(conn, associated)?.and_then(|t| t.description),
            };
            if !expanded.iter().any(|l| l.same_tag(&derived)) {
                expanded.push(derived);
            }
        }
    }
    Ok(Some(expanded))
}

/// [`add_derived_tags`] for the table and every column.
pub(crate) fn prepare_tags(conn: &Connection, table: &mut Table) -> Result<()> {
    table.tags = add_derived_tags(conn, table.tags.take())?;
    walk_columns_mut(&mut table.columns, |column| {
        column.tags = add_derived_tags(conn, column.tags.take())?;
        Ok(())
    })
}

/// Resolve schema, database and service, then assign FQNs, check the owner
/// and expand tags.
pub(crate) fn prepare_table(conn: &Connection, table: &mut Table) -> Result<()> {
    validate_entity_name(&table.name, "Table name")?;

    let schema_id = table
        .database_schema
        .as_ref()
        .map(|r| r.id)
        .ok_or_else(|| CatalogError::InvalidArgument("databaseSchema is required".to_string()))?;
    let schema: DatabaseSchema = store::load(
        conn,
        entity_type::DATABASE_SCHEMA,
        schema_id,
        Include::NonDeleted,
    )?;
    let service: DatabaseService = store::load(
        conn,
        entity_type::DATABASE_SERVICE,
        schema.service.id,
        Include::NonDeleted,
    )?;

    let table_fqn = fqn::add(&schema.fully_qualified_name, &table.name);
    assign_column_fqns(&table_fqn, &mut table.columns)?;
    table.fully_qualified_name = Some(table_fqn);
    table.database_schema = Some(schema.entity_reference());
    table.database = Some(schema.database.clone());
    table.service = Some(service.entity_reference());
    table.service_type = Some(service.service_type);

    if let Some(owner) = &table.owner {
        table.owner = Some(resolve_owner(conn, owner)?);
    }
    prepare_tags(conn, table)
}

/// Apply the tags of the table and of every column.
pub(crate) fn apply_all_tags(conn: &Connection, table: &Table) -> Result<()> {
    for label in table.tags.iter().flatten() {
        tag::apply_tag(conn, label, table.fqn())?;
    }
    walk_columns(&table.columns, |column| {
        for label in column.tags.iter().flatten() {
            tag::apply_tag(conn, label, column.fqn())?;
        }
        Ok(())
    })
}

/// Relationships written when a table is first stored.
pub(crate) fn store_relationships(conn: &Connection, table: &Table) -> Result<()> {
    if let Some(schema) = &table.database_schema {
        relationship::add_relationship(
            conn,
            schema.id,
            table.id,
            entity_type::DATABASE_SCHEMA,
            entity_type::TABLE,
            Relationship::Contains,
        )?;
    }
    if let Some(owner) = &table.owner {
        relationship::add_relationship(
            conn,
            owner.id,
            table.id,
            &owner.entity_type,
            entity_type::TABLE,
            Relationship::Owns,
        )?;
    }
    apply_all_tags(conn, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use tessera_catalog_core::ColumnDataType;
    use tessera_catalog_storage::dao::tag::TagDefinition;

    #[test]
    fn test_assign_nested_fqns() {
        let mut table = nested_table();
        walk_columns_mut(&mut table.columns, |c| {
            c.fully_qualified_name = None;
            Ok(())
        })
        .unwrap();

        assign_column_fqns("svc.db.public.events", &mut table.columns).unwrap();
        let zip = &table.columns[1].children.as_ref().unwrap()[0];
        assert_eq!(zip.fqn(), "svc.db.public.events.address.zip");
    }

    #[test]
    fn test_assign_quotes_dotted_names() {
        let mut columns = vec![Column::new("a.b", ColumnDataType::Int)];
        assign_column_fqns("svc.db.public.t", &mut columns).unwrap();
        assert_eq!(columns[0].fqn(), "svc.db.public.t.\"a.b\"");
    }

    #[test]
    fn test_assign_rejects_duplicate_siblings() {
        let mut columns = vec![
            Column::new("id", ColumnDataType::Int),
            Column::new("id", ColumnDataType::Varchar),
        ];
        let err = assign_column_fqns("svc.db.public.dup", &mut columns).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));

        let mut nested = Column::new("address", ColumnDataType::Struct);
        nested.children = Some(vec![
            Column::new("zip", ColumnDataType::Varchar),
            Column::new("zip", ColumnDataType::Int),
        ]);
        let err = assign_column_fqns("svc.db.public.dup", &mut [nested]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[test]
    fn test_same_name_under_different_parents_is_allowed() {
        let mut billing = Column::new("billing", ColumnDataType::Struct);
        billing.children = Some(vec![Column::new("zip", ColumnDataType::Varchar)]);
        let mut shipping = Column::new("shipping", ColumnDataType::Struct);
        shipping.children = Some(vec![Column::new("zip", ColumnDataType::Varchar)]);
        let mut columns = vec![billing, shipping];

        assign_column_fqns("svc.db.public.t", &mut columns).unwrap();
        let zip = &columns[1].children.as_ref().unwrap()[0];
        assert_eq!(zip.fqn(), "svc.db.public.t.shipping.zip");
    }

    #[test]
    fn test_walk_order_is_parents_first() {
        let table = nested_table();
        let mut names = Vec::new();
        walk_columns(&table.columns, |c| {
            names.push(c.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(names, vec!["id", "address", "zip", "city"]);
    }

    #[test]
    fn test_derived_tags_are_appended_once() {
        let conn = test_connection();
        tag::create_tag(
            &conn,
            &TagDefinition {
                fqn: "Tier.Gold".to_string(),
                description: Some("Gold tier".to_string()),
                associated_tags: Vec::new(),
            },
        )
        .unwrap();
        tag::create_tag(
            &conn,
            &TagDefinition {
                fqn: "Glossary.Revenue".to_string(),
                description: None,
                associated_tags: vec!["Tier.Gold".to_string()],
            },
        )
        .unwrap();

        let labels = add_derived_tags(
            &conn,
            Some(vec![
                TagLabel::manual("Glossary.Revenue"),
                TagLabel::manual("Glossary.Revenue"),
            ]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].tag_fqn, "Tier.Gold");
        assert_eq!(labels[1].label_type, LabelType::Derived);
        assert_eq!(labels[1].description.as_deref(), Some("Gold tier"));
    }

    #[test]
    fn test_unknown_tag_is_not_found() {
        let conn = test_connection();
        let err = add_derived_tags(&conn, Some(vec![TagLabel::manual("PII.Nope")])).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}
