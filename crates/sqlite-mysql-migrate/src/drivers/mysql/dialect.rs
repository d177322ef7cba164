//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides identifier quoting and literal encoding for generated scripts.

use crate::core::identifier::quote_mysql;
use crate::core::traits::Dialect;

/// MySQL/MariaDB dialect implementation.
///
/// Literals follow the default `sql_mode` (backslash escapes enabled), which is
/// what `mysql` clients assume when replaying a dump.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Render a finite float so MySQL reads it back as the same double.
    pub fn float_literal(&self, value: f64) -> Option<String> {
        if !value.is_finite() {
            return None;
        }
        // Debug formatting is the shortest round-trip representation
        Some(format!("{:?}", value))
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
    }

    fn quote_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for ch in value.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    fn bytes_literal(&self, value: &[u8]) -> String {
        if value.is_empty() {
            // X'' is legal but some clients choke on it
            return "''".to_string();
        }
        format!("X'{}'", hex::encode_upper(value))
    }
}
