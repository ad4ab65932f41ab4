//! Tag definitions and tag applications.

use rusqlite::{params, Connection, OptionalExtension};
use tessera_catalog_core::{CatalogError, LabelType, Result, TagLabel, TagSource, TagState};

use super::map_constraint;

/// A tag definition. Applying a tag also applies its associated tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    pub fqn: String,
    pub description: Option<String>,
    pub associated_tags: Vec<String>,
}

fn source_ordinal(source: TagSource) -> i64 {
    match source {
        TagSource::Tag => 0,
        TagSource::Glossary => 1,
    }
}

fn source_from(ordinal: i64) -> rusqlite::Result<TagSource> {
    match ordinal {
        0 => Ok(TagSource::Tag),
        1 => Ok(TagSource::Glossary),
        other => Err(invalid_ordinal("source", other)),
    }
}

fn label_type_ordinal(label_type: LabelType) -> i64 {
    match label_type {
        LabelType::Manual => 0,
        LabelType::Propagated => 1,
        LabelType::Automated => 2,
        LabelType::Derived => 3,
    }
}

fn label_type_from(ordinal: i64) -> rusqlite::Result<LabelType> {
    match ordinal {
        0 => Ok(LabelType::Manual),
        1 => Ok(LabelType::Propagated),
        2 => Ok(LabelType::Automated),
        3 => Ok(LabelType::Derived),
        other => Err(invalid_ordinal("label_type", other)),
    }
}

fn state_ordinal(state: TagState) -> i64 {
    match state {
        TagState::Suggested => 0,
        TagState::Confirmed => 1,
    }
}

fn state_from(ordinal: i64) -> rusqlite::Result<TagState> {
    match ordinal {
        0 => Ok(TagState::Suggested),
        1 => Ok(TagState::Confirmed),
        other => Err(invalid_ordinal("state", other)),
    }
}

fn invalid_ordinal(column: &str, value: i64) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Integer,
        format!("invalid {} ordinal {}", column, value).into(),
    )
}

pub fn create_tag(conn: &Connection, tag: &TagDefinition) -> Result<()> {
    let associated = serde_json::to_string(&tag.associated_tags)?;
    conn.execute(
        "INSERT INTO tag (fqn, description, associated_tags) VALUES (?1, ?2, ?3)",
        params![tag.fqn, tag.description, associated],
    )
    .map_err(|e| map_constraint(e, || format!("Tag {} already exists", tag.fqn)))?;
    Ok(())
}

pub fn get_tag(conn: &Connection, fqn: &str) -> Result<Option<TagDefinition>> {
    let row: Option<(String, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT fqn, description, associated_tags FROM tag WHERE fqn = ?1",
            [fqn],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    row.map(|(fqn, description, associated)| -> Result<TagDefinition> {
        let associated_tags = match associated {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(TagDefinition {
            fqn,
            description,
            associated_tags,
        })
    })
    .transpose()
}

/// Apply `label` to `target_fqn`. Re-applying the same tag is a no-op.
pub fn apply_tag(conn: &Connection, label: &TagLabel, target_fqn: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO tag_usage (source, tag_fqn, label_type, state, target_fqn)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            source_ordinal(label.source),
            label.tag_fqn,
            label_type_ordinal(label.label_type),
            state_ordinal(label.state),
            target_fqn
        ],
    )?;
    Ok(())
}

/// Tags applied to `target_fqn`, in application order.
pub fn get_tags(conn: &Connection, target_fqn: &str) -> Result<Vec<TagLabel>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT u.source, u.tag_fqn, u.label_type, u.state, t.description
        FROM tag_usage u LEFT JOIN tag t ON t.fqn = u.tag_fqn
        WHERE u.target_fqn = ?1
        ORDER BY u.rowid
        "#,
    )?;
    let labels = stmt
        .query_map([target_fqn], |row| {
            Ok(TagLabel {
                source: source_from(row.get(0)?)?,
                tag_fqn: row.get(1)?,
                label_type: label_type_from(row.get(2)?)?,
                state: state_from(row.get(3)?)?,
                description: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(labels)
}

/// Remove every tag applied to exactly `target_fqn`.
pub fn delete_tags_by_target(conn: &Connection, target_fqn: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM tag_usage WHERE target_fqn = ?1", [target_fqn])?)
}

/// Remove tags applied to `target_fqn` and to anything nested under it.
pub fn delete_tags_by_target_tree(conn: &Connection, target_fqn: &str) -> Result<usize> {
    Ok(conn.execute(
        r#"
        DELETE FROM tag_usage
        WHERE target_fqn = ?1 OR substr(target_fqn, 1, length(?1) + 1) = ?1 || '.'
        "#,
        [target_fqn],
    )?)
}

/// Look up a tag definition, failing if it does not exist.
pub fn require_tag(conn: &Connection, fqn: &str) -> Result<TagDefinition> {
    get_tag(conn, fqn)?.ok_or_else(|| CatalogError::NotFound(format!("Tag {} not found", fqn)))
}
