//! Value coercion and MySQL literal encoding.
//!
//! SQLite stores whatever a row hands it, so the cursor value is checked
//! against the target column's [`TypeFamily`] before it is rendered. A value
//! that has no faithful representation is rejected with a reason; the caller
//! decides what to substitute.

use crate::core::traits::{Dialect, TypeFamily};
use crate::core::value::SqlValue;
use crate::drivers::mysql::MysqlDialect;

/// Render `value` as a literal for a column of the given family.
///
/// Returns the reason when the value cannot be coerced.
pub fn encode_value(
    dialect: &MysqlDialect,
    value: &SqlValue<'_>,
    family: TypeFamily,
) -> Result<String, String> {
    match value {
        SqlValue::Null => Ok("NULL".to_string()),
        SqlValue::Integer(v) => Ok(encode_integer(dialect, *v, family)),
        SqlValue::Real(v) => encode_real(dialect, *v, family),
        SqlValue::Text(s) => encode_text(dialect, s, family),
        SqlValue::Bytes(b) => encode_bytes(dialect, b, family),
    }
}

fn encode_integer(dialect: &MysqlDialect, v: i64, family: TypeFamily) -> String {
    match family {
        TypeFamily::DateTime | TypeFamily::Date => format!("FROM_UNIXTIME({})", v),
        TypeFamily::Time => format!("SEC_TO_TIME({})", v),
        TypeFamily::Text | TypeFamily::Json | TypeFamily::Blob => {
            dialect.quote_string(&v.to_string())
        }
        _ => v.to_string(),
    }
}

fn encode_real(dialect: &MysqlDialect, v: f64, family: TypeFamily) -> Result<String, String> {
    let number = dialect
        .float_literal(v)
        .ok_or_else(|| format!("{} has no MySQL representation", v))?;
    Ok(match family {
        TypeFamily::DateTime | TypeFamily::Date => format!("FROM_UNIXTIME({})", number),
        TypeFamily::Time => format!("SEC_TO_TIME({})", number),
        TypeFamily::Text | TypeFamily::Json | TypeFamily::Blob => dialect.quote_string(&number),
        _ => number,
    })
}

fn encode_text(dialect: &MysqlDialect, s: &str, family: TypeFamily) -> Result<String, String> {
    match family {
        TypeFamily::Integer | TypeFamily::Decimal | TypeFamily::Float | TypeFamily::Year => {
            numeric_text(s, family).ok_or_else(|| {
                format!("text {} is not a valid {:?} value", preview(s), family)
            })
        }
        TypeFamily::Blob => Ok(dialect.bytes_literal(s.as_bytes())),
        _ => Ok(dialect.quote_string(s)),
    }
}

fn encode_bytes(dialect: &MysqlDialect, b: &[u8], family: TypeFamily) -> Result<String, String> {
    match family {
        TypeFamily::Blob => Ok(dialect.bytes_literal(b)),
        TypeFamily::Text
        | TypeFamily::Json
        | TypeFamily::DateTime
        | TypeFamily::Date
        | TypeFamily::Time => std::str::from_utf8(b)
            .map(|s| dialect.quote_string(s))
            .map_err(|_| format!("{} bytes are not valid UTF-8", b.len())),
        _ => std::str::from_utf8(b)
            .ok()
            .and_then(|s| numeric_text(s, family))
            .ok_or_else(|| format!("blob of {} bytes is not a {:?} value", b.len(), family)),
    }
}

/// Normalize numeric text, or `None` when it does not parse.
fn numeric_text(s: &str, family: TypeFamily) -> Option<String> {
    let trimmed = s.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v.to_string());
    }
    if family == TypeFamily::Year {
        return None;
    }
    match trimmed.parse::<f64>() {
        // f64 parsing accepts "inf" and "NaN"; both fail the finiteness check
        Ok(v) if v.is_finite() => {
            if family == TypeFamily::Integer && v.fract() != 0.0 {
                return None;
            }
            Some(trimmed.to_string())
        }
        _ => None,
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 32;
    if s.chars().count() <= MAX {
        format!("'{}'", s)
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("'{}...'", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: SqlValue<'_>, family: TypeFamily) -> Result<String, String> {
        encode_value(&MysqlDialect::new(), &value, family)
    }

    #[test]
    fn test_null_is_null_everywhere() {
        assert_eq!(enc(SqlValue::Null, TypeFamily::Integer).unwrap(), "NULL");
        assert_eq!(enc(SqlValue::Null, TypeFamily::Blob).unwrap(), "NULL");
    }

    #[test]
    fn test_numeric_targets() {
        assert_eq!(enc(SqlValue::Integer(-5), TypeFamily::Integer).unwrap(), "-5");
        assert_eq!(enc(SqlValue::Real(2.5), TypeFamily::Decimal).unwrap(), "2.5");
        assert_eq!(enc(" 42 ".into(), TypeFamily::Integer).unwrap(), "42");
        assert_eq!(enc("3.25".into(), TypeFamily::Decimal).unwrap(), "3.25");
        assert_eq!(enc("1e3".into(), TypeFamily::Float).unwrap(), "1e3");
        assert!(enc("abc".into(), TypeFamily::Integer).is_err());
        assert!(enc("1.5".into(), TypeFamily::Integer).is_err());
        assert!(enc("inf".into(), TypeFamily::Float).is_err());
        assert!(enc("NaN".into(), TypeFamily::Decimal).is_err());
        assert!(enc(SqlValue::Real(f64::NAN), TypeFamily::Float).is_err());
    }

    #[test]
    fn test_text_targets() {
        assert_eq!(enc("O'Brien".into(), TypeFamily::Text).unwrap(), "'O\\'Brien'");
        assert_eq!(enc(SqlValue::Integer(7), TypeFamily::Text).unwrap(), "'7'");
        assert_eq!(enc(SqlValue::Real(0.5), TypeFamily::Json).unwrap(), "'0.5'");
        assert_eq!(
            enc(SqlValue::bytes_owned(b"ok".to_vec()), TypeFamily::Text).unwrap(),
            "'ok'"
        );
        assert!(enc(SqlValue::bytes_owned(vec![0xff, 0xfe]), TypeFamily::Text).is_err());
    }

    #[test]
    fn test_temporal_targets() {
        assert_eq!(
            enc(SqlValue::Integer(1_700_000_000), TypeFamily::DateTime).unwrap(),
            "FROM_UNIXTIME(1700000000)"
        );
        assert_eq!(
            enc(SqlValue::Integer(0), TypeFamily::Date).unwrap(),
            "FROM_UNIXTIME(0)"
        );
        assert_eq!(
            enc("2024-01-02 03:04:05".into(), TypeFamily::DateTime).unwrap(),
            "'2024-01-02 03:04:05'"
        );
        assert_eq!(enc(SqlValue::Integer(2024), TypeFamily::Year).unwrap(), "2024");
    }

    #[test]
    fn test_numbers_into_time_are_seconds() {
        assert_eq!(
            enc(SqlValue::Integer(3_600), TypeFamily::Time).unwrap(),
            "SEC_TO_TIME(3600)"
        );
        assert_eq!(
            enc(SqlValue::Real(90.5), TypeFamily::Time).unwrap(),
            "SEC_TO_TIME(90.5)"
        );
        assert_eq!(enc("12:30:00".into(), TypeFamily::Time).unwrap(), "'12:30:00'");
    }

    /// Decode a single-quoted MySQL string literal the way the server reads it.
    fn unquote(literal: &str) -> String {
        let inner = &literal[1..literal.len() - 1];
        let mut out = String::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next().unwrap() {
                '0' => out.push('\0'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                'Z' => out.push('\x1a'),
                other => out.push(other),
            }
        }
        out
    }

    #[test]
    fn test_text_literal_survives_the_server() {
        let original = "Zoë's \\path\0end\r\n\x1a 東京";
        let literal = enc(original.into(), TypeFamily::Text).unwrap();
        assert!(!literal.contains('\0'));
        assert!(!literal.contains('\n'));
        assert_eq!(unquote(&literal), original);
    }

    #[test]
    fn test_blob_targets() {
        assert_eq!(
            enc(SqlValue::bytes_owned(vec![0xde, 0xad]), TypeFamily::Blob).unwrap(),
            "X'DEAD'"
        );
        assert_eq!(enc("AB".into(), TypeFamily::Blob).unwrap(), "X'4142'");
        assert_eq!(enc(SqlValue::Integer(3), TypeFamily::Blob).unwrap(), "'3'");
    }

    #[test]
    fn test_error_preview_is_truncated() {
        let long = "x".repeat(100);
        let err = enc(SqlValue::text_owned(long), TypeFamily::Integer).unwrap_err();
        assert!(err.contains("..."));
        assert!(err.len() < 100);
    }
}
