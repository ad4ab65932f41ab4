//! Input validation for the tessera catalog
//!
//! Provides validation functions to reject:
//! - Malformed entity and column names
//! - Tag FQNs that cannot be parsed
//! - Join observation dates outside the rolling window
//! - Path traversal in `file://` catalog URIs

use chrono::NaiveDate;

use crate::daily_count::{self, WINDOW_DAYS};
use crate::{fqn, CatalogError, Result};

/// Maximum length for entity names (services, schemas, tables, ...)
pub const MAX_ENTITY_NAME_LEN: usize = 256;

/// Maximum length for column names
pub const MAX_COLUMN_NAME_LEN: usize = 256;

/// Maximum length for tag FQNs
pub const MAX_TAG_FQN_LEN: usize = 512;

/// Validate an entity name
///
/// Requirements:
/// - Not empty
/// - <= 256 characters
/// - No control characters
pub fn validate_entity_name(name: &str, kind: &str) -> Result<()> {
    validate_name(name, kind, MAX_ENTITY_NAME_LEN)
}

/// Validate a column name (same rules as entity names)
pub fn validate_column_name(name: &str) -> Result<()> {
    validate_name(name, "Column name", MAX_COLUMN_NAME_LEN)
}

fn validate_name(name: &str, kind: &str, max_len: usize) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::InvalidArgument(format!(
            "{} cannot be empty",
            kind
        )));
    }

    if name.chars().count() > max_len {
        return Err(CatalogError::InvalidArgument(format!(
            "{} too long: {} > {} characters",
            kind,
            name.chars().count(),
            max_len
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(CatalogError::InvalidArgument(format!(
            "{} contains control characters",
            kind
        )));
    }

    Ok(())
}

/// Validate a tag FQN (e.g. `PII.Sensitive`)
///
/// Requirements:
/// - Not empty
/// - <= 512 characters
/// - Parses as an FQN
pub fn validate_tag_fqn(tag_fqn: &str) -> Result<()> {
    if tag_fqn.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "Tag FQN cannot be empty".to_string(),
        ));
    }

    if tag_fqn.len() > MAX_TAG_FQN_LEN {
        return Err(CatalogError::InvalidArgument(format!(
            "Tag FQN too long: {} > {} characters",
            tag_fqn.len(),
            MAX_TAG_FQN_LEN
        )));
    }

    fqn::split(tag_fqn)?;
    Ok(())
}

/// Validate the start date of a join observation.
///
/// Only dates in `[today - 30 days, today]` are accepted.
pub fn validate_join_start_date(start_date: &str, today: NaiveDate) -> Result<NaiveDate> {
    let date = daily_count::parse_date(start_date)?;
    if date < daily_count::window_start(today) || date > today {
        return Err(CatalogError::InvalidArgument(format!(
            "Date range can only include past {} days starting today",
            WINDOW_DAYS
        )));
    }
    Ok(date)
}

/// Validate file:// URI path for traversal attacks
///
/// Prevents:
/// - .. path components
/// - Null bytes
pub fn validate_file_uri_path(path: &str) -> Result<()> {
    if path.contains("..") {
        return Err(CatalogError::InvalidArgument(
            "Path contains traversal pattern (..)".to_string(),
        ));
    }

    if path.contains('\0') {
        return Err(CatalogError::InvalidArgument(
            "Path contains null byte".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity_names() {
        assert!(validate_entity_name("orders", "Table name").is_ok());
        assert!(validate_entity_name("dim.customer", "Table name").is_ok());
        assert!(validate_entity_name("Événements 2024", "Table name").is_ok());
    }

    #[test]
    fn test_invalid_entity_names() {
        assert!(validate_entity_name("", "Table name").is_err()); // Empty
        assert!(validate_entity_name("   ", "Table name").is_err()); // Blank
        assert!(validate_entity_name(&"a".repeat(257), "Table name").is_err()); // Too long
        assert!(validate_entity_name("bad\nname", "Table name").is_err()); // Control char
    }

    #[test]
    fn test_column_names() {
        assert!(validate_column_name("customer_id").is_ok());
        assert!(validate_column_name("").is_err());
    }

    #[test]
    fn test_tag_fqns() {
        assert!(validate_tag_fqn("PII.Sensitive").is_ok());
        assert!(validate_tag_fqn("Tier.Tier1").is_ok());
        assert!(validate_tag_fqn("").is_err());
        assert!(validate_tag_fqn("PII..Sensitive").is_err());
        assert!(validate_tag_fqn(&"a".repeat(513)).is_err());
    }

    #[test]
    fn test_join_start_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!(validate_join_start_date("2024-03-31", today).is_ok());
        assert!(validate_join_start_date("2024-03-01", today).is_ok()); // exactly 30 days
        assert!(validate_join_start_date("2024-02-29", today).is_err()); // 31 days
        assert!(validate_join_start_date("2024-04-01", today).is_err()); // future
        assert!(validate_join_start_date("yesterday", today).is_err());
    }

    #[test]
    fn test_file_uri_paths() {
        assert!(validate_file_uri_path("/var/lib/tessera/catalog.db").is_ok());
        assert!(validate_file_uri_path("../../etc/passwd").is_err());
        assert!(validate_file_uri_path("/tmp/cat\0.db").is_err());
    }
}
