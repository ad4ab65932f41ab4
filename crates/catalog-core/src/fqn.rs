//! Fully-qualified names.
//!
//! FQNs are dotted paths: `service.database.schema.table[.column[.child...]]`.
//! A name that itself contains the separator (or a quote) is wrapped in
//! double quotes, with inner quotes doubled, so that [`split`] can always
//! recover the original names.

use crate::{CatalogError, Result};

pub const SEPARATOR: char = '.';
const QUOTE: char = '"';

/// Number of FQN parts that make up a table FQN.
const TABLE_FQN_PARTS: usize = 4;

/// Quote `name` if it contains a reserved character.
pub fn quote_name(name: &str) -> String {
    if name.contains(SEPARATOR) || name.contains(QUOTE) {
        format!("{QUOTE}{}{QUOTE}", name.replace(QUOTE, "\"\""))
    } else {
        name.to_string()
    }
}

/// Append `name` to `parent`.
pub fn add(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, quote_name(name))
}

/// Build an FQN from raw (unquoted) names.
pub fn build<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_name(n.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Split an FQN into its raw names.
pub fn split(fqn: &str) -> Result<Vec<String>> {
    if fqn.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "Fully qualified name cannot be empty".to_string(),
        ));
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    // Set once a quoted segment closes; only a separator may follow.
    let mut closed_quote = false;
    let mut chars = fqn.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    current.push(QUOTE);
                } else {
                    in_quotes = false;
                    closed_quote = true;
                }
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            SEPARATOR => {
                if current.is_empty() && !closed_quote {
                    return Err(invalid_fqn(fqn, "empty name"));
                }
                parts.push(std::mem::take(&mut current));
                closed_quote = false;
            }
            QUOTE => {
                if !current.is_empty() || closed_quote {
                    return Err(invalid_fqn(fqn, "quote inside a name"));
                }
                in_quotes = true;
            }
            _ => {
                if closed_quote {
                    return Err(invalid_fqn(fqn, "text after a closing quote"));
                }
                current.push(c);
            }
        }
    }

    if in_quotes {
        return Err(invalid_fqn(fqn, "unterminated quote"));
    }
    if current.is_empty() && !closed_quote {
        return Err(invalid_fqn(fqn, "empty name"));
    }
    parts.push(current);
    Ok(parts)
}

fn invalid_fqn(fqn: &str, reason: &str) -> CatalogError {
    CatalogError::InvalidArgument(format!("Invalid fully qualified name {}: {}", fqn, reason))
}

/// Table FQN that a column FQN belongs to.
pub fn get_table_fqn(column_fqn: &str) -> Result<String> {
    let parts = split(column_fqn)?;
    if parts.len() <= TABLE_FQN_PARTS {
        return Err(CatalogError::InvalidArgument(format!(
            "Invalid column fully qualified name {}",
            column_fqn
        )));
    }
    Ok(build(&parts[..TABLE_FQN_PARTS]))
}

/// Top-level column name of a column FQN, relative to its table.
pub fn get_column_name(column_fqn: &str) -> Result<String> {
    let mut parts = split(column_fqn)?;
    if parts.len() <= TABLE_FQN_PARTS {
        return Err(CatalogError::InvalidArgument(format!(
            "Invalid column fully qualified name {}",
            column_fqn
        )));
    }
    Ok(parts.swap_remove(TABLE_FQN_PARTS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_plain_names() {
        assert_eq!(add("svc.db.public", "orders"), "svc.db.public.orders");
        assert_eq!(build(&["svc", "db", "public", "orders"]), "svc.db.public.orders");
    }

    #[test]
    fn test_quoting_round_trip() {
        let names = ["svc", "db.prod", "public", "weird\"name", "col"];
        let fqn = build(&names);
        assert_eq!(fqn, "svc.\"db.prod\".public.\"weird\"\"name\".col");
        assert_eq!(split(&fqn).unwrap(), names);
    }

    #[test]
    fn test_split_rejects_malformed() {
        assert!(split("").is_err());
        assert!(split("a..b").is_err());
        assert!(split("a.b.").is_err());
        assert!(split("a.\"b").is_err());
        assert!(split("a.b\"c\"").is_err());
        assert!(split("a.\"b\"c").is_err());
    }

    #[test]
    fn test_quoted_empty_name_is_allowed() {
        assert_eq!(split("a.\"\".c").unwrap(), vec!["a", "", "c"]);
    }

    #[test]
    fn test_table_fqn_and_column_name() {
        let column = "svc.db.public.orders.customer_id";
        assert_eq!(get_table_fqn(column).unwrap(), "svc.db.public.orders");
        assert_eq!(get_column_name(column).unwrap(), "customer_id");

        let nested = "svc.db.public.orders.address.zip";
        assert_eq!(get_table_fqn(nested).unwrap(), "svc.db.public.orders");
        assert_eq!(get_column_name(nested).unwrap(), "address");

        let quoted = "svc.db.public.orders.\"a.b\"";
        assert_eq!(get_column_name(quoted).unwrap(), "a.b");
    }

    #[test]
    fn test_table_fqn_is_not_a_column_fqn() {
        assert!(get_table_fqn("svc.db.public.orders").is_err());
        assert!(get_column_name("svc.db.public").is_err());
    }
}
