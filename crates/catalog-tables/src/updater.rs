//! Table updater: diffs a stored table against its replacement, rewrites the
//! relationship and tag rows that changed, and decides the next version.
//!
//! Changes are collected in a [`ChangeSet`]. Any rule may mark the set as
//! major and nothing ever clears that flag again. A major change moves the
//! table to the next whole version, a minor one adds 0.1, and an update with
//! no recorded change keeps the current version.
//!
//! The column tree is walked with an explicit stack of index paths into the
//! updated table, so nesting depth is bounded by the heap rather than the
//! call stack.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tessera_catalog_core::{
    entity_type, fqn, next_version, ChangeDescription, Column, FieldChange, Relationship, Result,
    Table, TableConstraint, TagLabel,
};
use tessera_catalog_storage::dao::{relationship, tag};

/// How the replacement was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Full replacement. Owner and tags missing from the request are kept,
    /// and automated actors cannot overwrite curated text.
    Put,
    /// Partial update already applied on top of the stored table.
    Patch,
}

/// Field-level deltas plus a monotonic severity flag.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    added: Vec<FieldChange>,
    updated: Vec<FieldChange>,
    deleted: Vec<FieldChange>,
    major: bool,
}

impl ChangeSet {
    pub fn record_added(&mut self, name: impl Into<String>, new_value: Value) {
        self.added.push(FieldChange {
            name: name.into(),
            old_value: None,
            new_value: Some(new_value),
        });
    }

    pub fn record_updated(&mut self, name: impl Into<String>, old_value: Value, new_value: Value) {
        self.updated.push(FieldChange {
            name: name.into(),
            old_value: Some(old_value),
            new_value: Some(new_value),
        });
    }

    pub fn record_deleted(&mut self, name: impl Into<String>, old_value: Value) {
        self.deleted.push(FieldChange {
            name: name.into(),
            old_value: Some(old_value),
            new_value: None,
        });
    }

    /// Mark the change as backward-incompatible. Cannot be undone.
    pub fn mark_major(&mut self) {
        self.major = true;
    }

    pub fn is_major(&self) -> bool {
        self.major
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn into_description(self, previous_version: f64) -> ChangeDescription {
        ChangeDescription {
            fields_added: self.added,
            fields_updated: self.updated,
            fields_deleted: self.deleted,
            previous_version,
        }
    }
}

/// Result of running the updater.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// The version after the update (unchanged if nothing changed)
    pub version: f64,
    pub change_description: Option<ChangeDescription>,
    pub major: bool,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        self.change_description.is_some()
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn opt_json<T: Serialize>(value: &Option<T>) -> Result<Value> {
    match value {
        Some(v) => to_json(v),
        None => Ok(Value::Null),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// Append every label of `original` that `updated` does not already carry.
pub fn merge_tags(updated: &mut Vec<TagLabel>, original: &[TagLabel]) {
    for label in original {
        if !updated.iter().any(|u| u.same_tag(label)) {
            updated.push(label.clone());
        }
    }
}

fn same_tag_set(a: &[TagLabel], b: &[TagLabel]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| y.same_tag(x)))
}

/// Sort constraints and each constraint's column list.
pub fn normalize_constraints(constraints: &[TableConstraint]) -> Vec<TableConstraint> {
    let mut normalized: Vec<TableConstraint> = constraints
        .iter()
        .map(|c| {
            let mut columns = c.columns.clone();
            columns.sort();
            TableConstraint {
                constraint_type: c.constraint_type,
                columns,
            }
        })
        .collect();
    normalized.sort();
    normalized
}

/// Shared per-update settings handed to every check.
#[derive(Debug, Clone, Copy)]
struct UpdateContext {
    operation: Operation,
    by_bot: bool,
}

impl UpdateContext {
    /// A bot PUT may not replace non-empty curated text.
    fn keeps_curated(&self, original: &Option<String>) -> bool {
        self.operation == Operation::Put && self.by_bot && !is_blank(original)
    }
}

/// One level of the column tree still to be compared.
struct Frame<'a> {
    field: String,
    original: &'a [Column],
    /// Index path from the table's columns to the updated column list
    path: Vec<usize>,
}

fn columns_at<'c>(root: &'c mut Vec<Column>, path: &[usize]) -> Option<&'c mut Vec<Column>> {
    let mut current = root;
    for &index in path {
        current = current.get_mut(index)?.children.as_mut()?;
    }
    Some(current)
}

/// Diffs one table against its replacement.
pub struct TableUpdater<'a> {
    conn: &'a Connection,
    original: &'a Table,
    updated: &'a mut Table,
    ctx: UpdateContext,
    changes: ChangeSet,
}

impl<'a> TableUpdater<'a> {
    pub fn new(
        conn: &'a Connection,
        original: &'a Table,
        updated: &'a mut Table,
        operation: Operation,
        by_bot: bool,
    ) -> Self {
        Self {
            conn,
            original,
            updated,
            ctx: UpdateContext { operation, by_bot },
            changes: ChangeSet::default(),
        }
    }

    /// Run every check, write the affected relationship and tag rows, and
    /// set the new version and change description on the updated table.
    pub fn update(mut self) -> Result<UpdateOutcome> {
        self.update_deleted()?;
        self.update_description()?;
        self.update_display_name()?;
        self.update_owner()?;
        self.update_tags()?;
        self.update_table_type()?;
        self.update_view_definition()?;
        self.update_data_model()?;
        self.update_constraints()?;
        self.update_columns()?;

        let original_version = self.original.version;
        if self.changes.is_empty() {
            self.updated.version = original_version;
            self.updated.updated_at = self.original.updated_at;
            self.updated.updated_by = self.original.updated_by.clone();
            self.updated.change_description = self.original.change_description.clone();
            return Ok(UpdateOutcome {
                version: original_version,
                change_description: None,
                major: false,
            });
        }

        let major = self.changes.is_major();
        let version = next_version(original_version, major);
        let description = self.changes.into_description(original_version);
        self.updated.version = version;
        self.updated.change_description = Some(description.clone());

        tracing::info!(
            table = %self.updated.fqn(),
            from = original_version,
            to = version,
            major,
            "Table updated"
        );

        Ok(UpdateOutcome {
            version,
            change_description: Some(description),
            major,
        })
    }

    fn update_deleted(&mut self) -> Result<()> {
        if self.original.deleted != self.updated.deleted {
            self.changes.record_updated(
                "deleted",
                Value::Bool(self.original.deleted),
                Value::Bool(self.updated.deleted),
            );
        }
        Ok(())
    }

    fn update_description(&mut self) -> Result<()> {
        if self.ctx.keeps_curated(&self.original.description) {
            self.updated.description = self.original.description.clone();
            return Ok(());
        }
        if self.original.description != self.updated.description {
            self.changes.record_updated(
                "description",
                opt_json(&self.original.description)?,
                opt_json(&self.updated.description)?,
            );
        }
        Ok(())
    }

    fn update_display_name(&mut self) -> Result<()> {
        if self.ctx.keeps_curated(&self.original.display_name) {
            self.updated.display_name = self.original.display_name.clone();
            return Ok(());
        }
        if self.original.display_name != self.updated.display_name {
            self.changes.record_updated(
                "displayName",
                opt_json(&self.original.display_name)?,
                opt_json(&self.updated.display_name)?,
            );
        }
        Ok(())
    }

    fn update_owner(&mut self) -> Result<()> {
        if self.ctx.operation == Operation::Put && self.updated.owner.is_none() {
            self.updated.owner = self.original.owner.clone();
            return Ok(());
        }

        let original_id = self.original.owner.as_ref().map(|o| o.id);
        let updated_id = self.updated.owner.as_ref().map(|o| o.id);
        if original_id == updated_id {
            return Ok(());
        }

        let table_id = self.updated.id;
        relationship::delete_from(self.conn, table_id, Relationship::Owns, entity_type::USER)?;
        if let Some(owner) = &self.updated.owner {
            relationship::add_relationship(
                self.conn,
                owner.id,
                table_id,
                &owner.entity_type,
                entity_type::TABLE,
                Relationship::Owns,
            )?;
        }

        self.changes.record_updated(
            "owner",
            opt_json(&self.original.owner)?,
            opt_json(&self.updated.owner)?,
        );
        Ok(())
    }

    fn update_tags(&mut self) -> Result<()> {
        let original = self.original.tags.clone().unwrap_or_default();
        let mut updated = self.updated.tags.take().unwrap_or_default();
        let table_fqn = self.updated.fqn().to_string();
        rewrite_tags(
            self.conn,
            &mut self.changes,
            self.ctx,
            "tags",
            &table_fqn,
            &original,
            &mut updated,
        )?;
        self.updated.tags = (!updated.is_empty()).then_some(updated);
        Ok(())
    }

    fn update_table_type(&mut self) -> Result<()> {
        if self.original.table_type != self.updated.table_type {
            self.changes.record_updated(
                "tableType",
                opt_json(&self.original.table_type)?,
                opt_json(&self.updated.table_type)?,
            );
        }
        Ok(())
    }

    fn update_view_definition(&mut self) -> Result<()> {
        if self.original.view_definition != self.updated.view_definition {
            self.changes.record_updated(
                "viewDefinition",
                opt_json(&self.original.view_definition)?,
                opt_json(&self.updated.view_definition)?,
            );
        }
        Ok(())
    }

    fn update_data_model(&mut self) -> Result<()> {
        match (&self.original.data_model, &self.updated.data_model) {
            (None, Some(model)) => self.changes.record_added("dataModel", to_json(model)?),
            (Some(before), Some(after)) if before != after => {
                self.changes
                    .record_updated("dataModel", to_json(before)?, to_json(after)?)
            }
            (Some(before), None) => self.changes.record_deleted("dataModel", to_json(before)?),
            _ => {}
        }
        Ok(())
    }

    fn update_constraints(&mut self) -> Result<()> {
        let original =
            normalize_constraints(self.original.table_constraints.as_deref().unwrap_or(&[]));
        let updated =
            normalize_constraints(self.updated.table_constraints.as_deref().unwrap_or(&[]));

        let added: Vec<_> = updated.iter().filter(|c| !original.contains(c)).collect();
        let deleted: Vec<_> = original.iter().filter(|c| !updated.contains(c)).collect();
        if !added.is_empty() {
            self.changes.record_added("tableConstraints", to_json(&added)?);
        }
        if !deleted.is_empty() {
            self.changes
                .record_deleted("tableConstraints", to_json(&deleted)?);
        }
        Ok(())
    }

    fn update_columns(&mut self) -> Result<()> {
        let conn = self.conn;
        let ctx = self.ctx;
        let original: &'a Table = self.original;
        let changes = &mut self.changes;
        let root = &mut self.updated.columns;

        let mut stack = vec![Frame {
            field: "columns".to_string(),
            original: &original.columns[..],
            path: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            let Some(updated) = columns_at(root, &frame.path) else {
                continue;
            };
            let nested = diff_column_list(conn, changes, ctx, &frame.field, frame.original, updated)?;

            // Reverse so siblings are visited in declaration order
            for (field, original, index) in nested.into_iter().rev() {
                let mut path = frame.path.clone();
                path.push(index);
                stack.push(Frame {
                    field,
                    original,
                    path,
                });
            }
        }
        Ok(())
    }
}

/// Rewrite the tag rows for `target_fqn` and record the change.
///
/// On PUT the stored tags are merged into the request first.
fn rewrite_tags(
    conn: &Connection,
    changes: &mut ChangeSet,
    ctx: UpdateContext,
    field: &str,
    target_fqn: &str,
    original: &[TagLabel],
    updated: &mut Vec<TagLabel>,
) -> Result<()> {
    if original.is_empty() && updated.is_empty() {
        return Ok(());
    }
    if ctx.operation == Operation::Put {
        merge_tags(updated, original);
    }
    if same_tag_set(original, updated) {
        return Ok(());
    }

    tag::delete_tags_by_target(conn, target_fqn)?;
    for label in updated.iter() {
        tag::apply_tag(conn, label, target_fqn)?;
    }

    let added: Vec<_> = updated
        .iter()
        .filter(|u| !original.iter().any(|o| o.same_tag(u)))
        .collect();
    let deleted: Vec<_> = original
        .iter()
        .filter(|o| !updated.iter().any(|u| u.same_tag(o)))
        .collect();
    if !added.is_empty() {
        changes.record_added(field, to_json(&added)?);
    }
    if !deleted.is_empty() {
        changes.record_deleted(field, to_json(&deleted)?);
    }
    Ok(())
}

/// Apply tags for a column and all of its descendants.
fn apply_column_tree_tags(conn: &Connection, column: &Column) -> Result<()> {
    let mut pending = vec![column];
    while let Some(column) = pending.pop() {
        for label in column.tags.iter().flatten() {
            tag::apply_tag(conn, label, column.fqn())?;
        }
        pending.extend(column.children.iter().flatten());
    }
    Ok(())
}

/// Compare one level of columns. Returns the matched pairs whose children
/// still need comparing, as (field name, original children, updated index).
fn diff_column_list<'o>(
    conn: &Connection,
    changes: &mut ChangeSet,
    ctx: UpdateContext,
    field: &str,
    original: &'o [Column],
    updated: &mut [Column],
) -> Result<Vec<(String, &'o [Column], usize)>> {
    let deleted: Vec<&Column> = original
        .iter()
        .filter(|o| !updated.iter().any(|u| u.same_identity(o)))
        .collect();
    let added_indexes: Vec<usize> = updated
        .iter()
        .enumerate()
        .filter(|(_, u)| !original.iter().any(|o| o.same_identity(u)))
        .map(|(i, _)| i)
        .collect();

    if !deleted.is_empty() {
        // Removing a column breaks readers of the old shape
        changes.mark_major();
        for column in &deleted {
            tag::delete_tags_by_target_tree(conn, column.fqn())?;
        }
        let stripped: Vec<Column> = deleted.iter().map(|c| c.stripped()).collect();
        changes.record_deleted(field, to_json(&stripped)?);
    }

    for &index in &added_indexes {
        let column = &mut updated[index];
        if let Some(previous) = deleted.iter().find(|d| d.name == column.name) {
            carry_forward(previous, column);
        }
        apply_column_tree_tags(conn, column)?;
    }
    if !added_indexes.is_empty() {
        let stripped: Vec<Column> = added_indexes
            .iter()
            .map(|&i| updated[i].stripped())
            .collect();
        changes.record_added(field, to_json(&stripped)?);
    }

    let mut nested = Vec::new();
    for (index, column) in updated.iter_mut().enumerate() {
        let Some(stored) = original.iter().find(|o| o.same_identity(column)) else {
            continue;
        };
        let column_field = format!("{}.{}", field, fqn::quote_name(&column.name));
        diff_column(conn, changes, ctx, &column_field, stored, column)?;

        if let (Some(children), Some(_)) = (stored.children.as_deref(), column.children.as_ref()) {
            nested.push((column_field, children, index));
        }
    }
    Ok(nested)
}

/// A re-added column inherits text and tags its predecessor had, but never
/// overwrites what the request supplied.
fn carry_forward(previous: &Column, added: &mut Column) {
    if is_blank(&added.description) && !is_blank(&previous.description) {
        added.description = previous.description.clone();
    }
    let added_has_tags = added.tags.as_ref().is_some_and(|t| !t.is_empty());
    let previous_has_tags = previous.tags.as_ref().is_some_and(|t| !t.is_empty());
    if !added_has_tags && previous_has_tags {
        added.tags = previous.tags.clone();
    }
}

fn diff_column(
    conn: &Connection,
    changes: &mut ChangeSet,
    ctx: UpdateContext,
    field: &str,
    stored: &Column,
    column: &mut Column,
) -> Result<()> {
    if ctx.keeps_curated(&stored.description) {
        column.description = stored.description.clone();
    } else if stored.description != column.description {
        changes.record_updated(
            format!("{}.description", field),
            opt_json(&stored.description)?,
            opt_json(&column.description)?,
        );
    }

    if ctx.keeps_curated(&stored.display_name) {
        column.display_name = stored.display_name.clone();
    } else if stored.display_name != column.display_name {
        changes.record_updated(
            format!("{}.displayName", field),
            opt_json(&stored.display_name)?,
            opt_json(&column.display_name)?,
        );
    }

    if stored.constraint != column.constraint {
        changes.record_updated(
            format!("{}.constraint", field),
            opt_json(&stored.constraint)?,
            opt_json(&column.constraint)?,
        );
    }

    for (name, before, after) in [
        ("dataLength", stored.data_length, column.data_length),
        ("precision", stored.precision, column.precision),
        ("scale", stored.scale, column.scale),
    ] {
        if before == after {
            continue;
        }
        changes.record_updated(
            format!("{}.{}", field, name),
            opt_json(&before)?,
            opt_json(&after)?,
        );
        // Narrowing a set size can truncate existing values
        if let (Some(before), Some(after)) = (before, after) {
            if after < before {
                changes.mark_major();
            }
        }
    }

    let original_tags = stored.tags.clone().unwrap_or_default();
    let mut updated_tags = column.tags.take().unwrap_or_default();
    rewrite_tags(
        conn,
        changes,
        ctx,
        &format!("{}.tags", field),
        column.fqn(),
        &original_tags,
        &mut updated_tags,
    )?;
    column.tags = (!updated_tags.is_empty()).then_some(updated_tags);
    Ok(())
}
