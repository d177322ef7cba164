//! Identifier validation, shortening, and quoting for MySQL output.
//!
//! SQLite accepts identifiers of any length and nearly any content, while MySQL
//! caps identifiers at 64 characters. Long names are shortened deterministically
//! so that every reference to the same source name resolves to the same target
//! name across the whole script.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::error::{MigrateError, Result};

/// MySQL identifier length limit, in characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Hex digits of the hash suffix appended to shortened names.
const HASH_SUFFIX_LEN: usize = 8;

/// Validate a source identifier before it is used in generated SQL.
///
/// Rejects empty identifiers and identifiers containing NUL, which MySQL
/// cannot represent even when quoted.
///
/// # Errors
///
/// Returns `MigrateError::SchemaValidation` with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::SchemaValidation(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::SchemaValidation(format!(
            "Identifier contains a null byte: {:?}",
            name
        )));
    }

    Ok(())
}

/// Shorten an identifier to the MySQL limit.
///
/// Names within the limit are returned unchanged. Longer names keep their first
/// characters and end in `_` plus the first 8 hex digits of the SHA-256 of the
/// full name, so distinct long names stay distinct.
pub fn mysql_name(name: &str) -> Cow<'_, str> {
    if name.chars().count() <= MAX_IDENTIFIER_LENGTH {
        return Cow::Borrowed(name);
    }
    let digest = Sha256::digest(name.as_bytes());
    let suffix = &hex::encode(digest)[..HASH_SUFFIX_LEN];
    let keep = MAX_IDENTIFIER_LENGTH - HASH_SUFFIX_LEN - 1;
    let prefix: String = name.chars().take(keep).collect();
    Cow::Owned(format!("{}_{}", prefix, suffix))
}

/// Shorten and quote an identifier for MySQL (backticks, embedded backticks doubled).
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", mysql_name(name).replace('`', "``"))
}

/// Make text safe to place on a single `-- ` comment line.
///
/// Control characters (newlines included) are written as Rust-style escapes,
/// so a source name can never end the comment and leak into live SQL.
pub fn comment_safe(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Build a generated object name such as `idx_users_email` or `fk_orders_1`.
pub fn derived_name(prefix: &str, parts: &[&str]) -> String {
    let mut name = prefix.to_string();
    for part in parts {
        name.push('_');
        name.push_str(part);
    }
    mysql_name(&name).into_owned()
}
