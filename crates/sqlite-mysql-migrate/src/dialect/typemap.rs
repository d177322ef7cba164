//! SQLite → MySQL type mapping.
//!
//! The mapper is a pure function of the column descriptor (affinity, declared
//! type, default, key flags, and sampled statistics) plus the target version.
//! Every input maps to exactly one target type; anything unrecognized falls
//! back to LONGTEXT with a warning.

use tracing::debug;

use crate::config::MigrationConfig;
use crate::core::schema::{Affinity, Column, SchemaModel};
use crate::core::traits::{
    ColumnMapping, Confidence, Dialect, MappingWarning, TypeFamily, TypeMapper, TypeMapping,
};
use crate::drivers::mysql::{MysqlDialect, MysqlVersion};
use crate::error::Result;
use crate::report::{ReportHandle, WarningKind};

/// Longest VARCHAR used for key columns that declare no length.
const KEY_VARCHAR_LENGTH: i64 = 255;

/// MySQL DECIMAL limits.
const MAX_DECIMAL_PRECISION: u32 = 65;
const MAX_DECIMAL_SCALE: u32 = 30;

/// SQLite → MySQL type mapper.
#[derive(Debug, Clone)]
pub struct SqliteToMysqlMapper {
    version: MysqlVersion,
    varchar_threshold: u32,
    decimal_precision: u32,
    decimal_scale: u32,
    infer_booleans: bool,
    dialect: MysqlDialect,
}

impl SqliteToMysqlMapper {
    /// Create a mapper with default options for the given target version.
    pub fn new(version: MysqlVersion) -> Self {
        Self {
            version,
            varchar_threshold: 255,
            decimal_precision: 10,
            decimal_scale: 2,
            infer_booleans: true,
            dialect: MysqlDialect::new(),
        }
    }

    /// Create a mapper from migration options.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            version: config.mysql_version()?,
            varchar_threshold: config.varchar_threshold,
            decimal_precision: config.default_decimal_precision,
            decimal_scale: config.default_decimal_scale,
            infer_booleans: config.infer_booleans,
            dialect: MysqlDialect::new(),
        })
    }

    fn map_integer(&self, col: &Column) -> TypeMapping {
        let base = col.base_type();
        let stats = col.stats.clone().unwrap_or_default();

        let wide_hint = base.contains("BIGINT")
            || base.contains("INT8")
            || base.contains("INT64")
            || base.contains("BIG INT");
        if wide_hint || col.is_rowid_alias || col.is_autoincrement {
            return TypeMapping::lossless("BIGINT", TypeFamily::Integer);
        }
        if !stats.int_range_within(i32::MIN as i64, i32::MAX as i64) {
            return TypeMapping::lossless("BIGINT", TypeFamily::Integer);
        }

        if self.infer_booleans
            && !col.is_primary_key()
            && is_boolean_default(col)
            && stats.int_range_within(0, 1)
        {
            return TypeMapping::lossy(
                "TINYINT(1)",
                TypeFamily::Integer,
                WarningKind::LowConfidence,
                format!(
                    "column {} ({}) inferred as boolean from its 0/1 default",
                    col.name, col.declared_type
                ),
            );
        }

        let sized = match base.as_str() {
            "TINYINT" if stats.int_range_within(-128, 127) => Some("TINYINT"),
            "SMALLINT" if stats.int_range_within(-32_768, 32_767) => Some("SMALLINT"),
            "MEDIUMINT" if stats.int_range_within(-8_388_608, 8_388_607) => Some("MEDIUMINT"),
            _ => None,
        };
        TypeMapping::lossless(sized.unwrap_or("INT"), TypeFamily::Integer)
    }

    fn map_text(&self, col: &Column) -> TypeMapping {
        let observed = col.stats.as_ref().and_then(|s| s.max_length);

        if let Some(len) = col.declared_length() {
            if len > 0 && len <= self.varchar_threshold {
                match observed {
                    Some(max) if max > len as i64 => {
                        return TypeMapping::lossy(
                            "LONGTEXT",
                            TypeFamily::Text,
                            WarningKind::TypeFallback,
                            format!(
                                "column {} declared {} but holds values up to {} characters",
                                col.name, col.declared_type, max
                            ),
                        );
                    }
                    _ => {
                        return TypeMapping::lossless(format!("VARCHAR({})", len), TypeFamily::Text)
                    }
                }
            }
        }

        // Key columns need a bounded type to be indexed without a prefix
        if col.is_primary_key() && observed.map_or(true, |max| max <= KEY_VARCHAR_LENGTH) {
            return TypeMapping::lossless(
                format!("VARCHAR({})", KEY_VARCHAR_LENGTH),
                TypeFamily::Text,
            );
        }

        TypeMapping::lossless("LONGTEXT", TypeFamily::Text)
    }

    fn map_numeric(&self, col: &Column) -> TypeMapping {
        let base = col.base_type();
        match base.as_str() {
            "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => self.map_decimal(col),
            "BOOLEAN" | "BOOL" => TypeMapping::lossless("TINYINT(1)", TypeFamily::Integer),
            "DATETIME" | "TIMESTAMP" => TypeMapping::lossless("DATETIME", TypeFamily::DateTime),
            "DATE" => TypeMapping::lossless("DATE", TypeFamily::Date),
            "TIME" => TypeMapping::lossless("TIME", TypeFamily::Time),
            "YEAR" => TypeMapping::lossless("YEAR", TypeFamily::Year),
            "JSON" if self.version.supports_json() => {
                TypeMapping::lossless("JSON", TypeFamily::Json)
            }
            "JSON" => TypeMapping::lossy(
                "LONGTEXT",
                TypeFamily::Text,
                WarningKind::TypeFallback,
                format!(
                    "column {}: JSON type needs MySQL 5.7.8, target is {}",
                    col.name, self.version
                ),
            ),
            _ => fallback(col),
        }
    }

    fn map_decimal(&self, col: &Column) -> TypeMapping {
        let (precision, scale) = match col.declared_precision() {
            Some((p, s)) => (p, s.unwrap_or(0)),
            None => (self.decimal_precision, self.decimal_scale),
        };
        if precision == 0 {
            return TypeMapping::lossless(
                format!("DECIMAL({},{})", self.decimal_precision, self.decimal_scale),
                TypeFamily::Decimal,
            );
        }
        if precision > MAX_DECIMAL_PRECISION || scale > MAX_DECIMAL_SCALE || scale > precision {
            let p = precision.min(MAX_DECIMAL_PRECISION);
            let s = scale.min(MAX_DECIMAL_SCALE).min(p);
            return TypeMapping::lossy(
                format!("DECIMAL({},{})", p, s),
                TypeFamily::Decimal,
                WarningKind::TypeFallback,
                format!(
                    "column {}: {} exceeds MySQL DECIMAL limits, clamped",
                    col.name, col.declared_type
                ),
            );
        }
        TypeMapping::lossless(format!("DECIMAL({},{})", precision, scale), TypeFamily::Decimal)
    }

    /// Translate a SQLite default expression for a column of the given family.
    fn map_default(
        &self,
        col: &Column,
        family: TypeFamily,
        is_nullable: bool,
        warnings: &mut Vec<MappingWarning>,
    ) -> Option<String> {
        let raw = col.default.as_deref()?;
        let parsed = DefaultValue::parse(raw);
        let expressions = self.version.supports_expression_defaults();

        let rendered = match parsed {
            DefaultValue::Null => {
                return is_nullable.then(|| "NULL".to_string());
            }
            DefaultValue::Now(kind) => {
                if kind == NowKind::Timestamp && family == TypeFamily::DateTime {
                    return Some("CURRENT_TIMESTAMP".to_string());
                }
                if expressions {
                    return Some(format!("({})", kind.mysql_function()));
                }
                warnings.push(MappingWarning::new(
                    WarningKind::DefaultValue,
                    format!(
                        "column {}: default {} dropped, needs MySQL 8.0.13 expression defaults",
                        col.name, raw
                    ),
                ));
                return None;
            }
            DefaultValue::Number(n) => n,
            DefaultValue::Boolean(b) => if b { "1" } else { "0" }.to_string(),
            DefaultValue::String(s) => self.dialect.quote_string(&s),
            DefaultValue::Blob(hex) => format!("X'{}'", hex),
            DefaultValue::Expression(expr) => {
                warnings.push(MappingWarning::new(
                    WarningKind::DefaultValue,
                    format!(
                        "column {}: default expression {} passed through unchanged",
                        col.name, expr
                    ),
                ));
                return Some(format!("({})", expr));
            }
        };

        if family.needs_expression_default() {
            if expressions {
                return Some(format!("({})", rendered));
            }
            warnings.push(MappingWarning::new(
                WarningKind::DefaultValue,
                format!(
                    "column {}: literal default {} dropped, {:?} columns take defaults only on MySQL 8.0.13+",
                    col.name, raw, family
                ),
            ));
            return None;
        }
        Some(rendered)
    }
}

impl TypeMapper for SqliteToMysqlMapper {
    fn source_dialect(&self) -> &str {
        "sqlite"
    }

    fn target_dialect(&self) -> &str {
        "mysql"
    }

    fn map_column(&self, col: &Column) -> ColumnMapping {
        let type_mapping = self.map_type(col);
        let mut warnings: Vec<MappingWarning> = type_mapping.warning.into_iter().collect();

        // MySQL forces NOT NULL on primary key columns
        let is_nullable = col.is_nullable && !col.is_primary_key();
        let default = if col.is_autoincrement {
            None
        } else {
            self.map_default(col, type_mapping.family, is_nullable, &mut warnings)
        };

        let confidence = if type_mapping.is_lossy {
            Confidence::Low
        } else {
            Confidence::High
        };

        ColumnMapping {
            name: col.name.clone(),
            source_type: col.declared_type.clone(),
            target_type: type_mapping.target_type,
            family: type_mapping.family,
            is_nullable,
            default,
            auto_increment: col.is_autoincrement,
            confidence,
            warnings,
        }
    }

    fn map_type(&self, col: &Column) -> TypeMapping {
        match col.affinity {
            Affinity::Integer => self.map_integer(col),
            Affinity::Text => self.map_text(col),
            Affinity::Real => TypeMapping::lossless("DOUBLE", TypeFamily::Float),
            Affinity::Blob => TypeMapping::lossless("LONGBLOB", TypeFamily::Blob),
            Affinity::Numeric => self.map_numeric(col),
            Affinity::Unknown => fallback(col),
        }
    }
}

fn fallback(col: &Column) -> TypeMapping {
    let declared = if col.declared_type.is_empty() {
        "no declared type".to_string()
    } else {
        format!("unrecognized type {}", col.declared_type)
    };
    TypeMapping::lossy(
        "LONGTEXT",
        TypeFamily::Text,
        WarningKind::TypeFallback,
        format!("column {}: {}, mapped to LONGTEXT", col.name, declared),
    )
}

fn is_boolean_default(col: &Column) -> bool {
    match col.default.as_deref().map(DefaultValue::parse) {
        Some(DefaultValue::Number(n)) => n == "0" || n == "1",
        Some(DefaultValue::Boolean(_)) => true,
        _ => false,
    }
}

/// Current-time default flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NowKind {
    Timestamp,
    Date,
    Time,
}

impl NowKind {
    fn mysql_function(&self) -> &'static str {
        match self {
            NowKind::Timestamp => "CURRENT_TIMESTAMP",
            NowKind::Date => "CURRENT_DATE",
            NowKind::Time => "CURRENT_TIME",
        }
    }
}

/// A classified SQLite default expression.
#[derive(Debug, Clone, PartialEq)]
enum DefaultValue {
    Null,
    Number(String),
    Boolean(bool),
    String(String),
    /// Uppercase hex digits.
    Blob(String),
    Now(NowKind),
    Expression(String),
}

impl DefaultValue {
    fn parse(raw: &str) -> Self {
        let text = peel_parens(raw.trim());
        let upper = text.to_ascii_uppercase();
        let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();

        match compact.as_str() {
            "NULL" => return DefaultValue::Null,
            "TRUE" => return DefaultValue::Boolean(true),
            "FALSE" => return DefaultValue::Boolean(false),
            "CURRENT_TIMESTAMP" => return DefaultValue::Now(NowKind::Timestamp),
            "CURRENT_DATE" => return DefaultValue::Now(NowKind::Date),
            "CURRENT_TIME" => return DefaultValue::Now(NowKind::Time),
            _ => {}
        }
        if compact.contains("'NOW'") {
            if compact.starts_with("DATETIME(") || compact.starts_with("STRFTIME(") {
                return DefaultValue::Now(NowKind::Timestamp);
            }
            if compact.starts_with("DATE(") {
                return DefaultValue::Now(NowKind::Date);
            }
            if compact.starts_with("TIME(") {
                return DefaultValue::Now(NowKind::Time);
            }
        }
        if let Some(n) = parse_number(text) {
            return DefaultValue::Number(n);
        }
        if let Some(s) = parse_quoted(text, '\'').or_else(|| parse_quoted(text, '"')) {
            return DefaultValue::String(s);
        }
        if (upper.starts_with("X'") || upper.starts_with("X\"")) && text.len() >= 3 {
            let hex = &text[2..text.len() - 1];
            if hex.len() % 2 == 0 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return DefaultValue::Blob(hex.to_ascii_uppercase());
            }
        }
        DefaultValue::Expression(text.to_string())
    }
}

/// Strip balanced outer parentheses: `((1))` → `1`.
fn peel_parens(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim();
        if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
            return trimmed;
        }
        // The opening paren must close at the very end
        let mut depth = 0i32;
        let mut in_quote: Option<char> = None;
        let mut closes_at_end = true;
        for (i, ch) in trimmed.char_indices() {
            match in_quote {
                Some(q) if ch == q => in_quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => in_quote = Some(ch),
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 && i != trimmed.len() - 1 {
                            closes_at_end = false;
                            break;
                        }
                    }
                    _ => {}
                },
            }
        }
        if !closes_at_end {
            return trimmed;
        }
        text = &trimmed[1..trimmed.len() - 1];
    }
}

/// Parse a numeric literal, returning its MySQL spelling.
fn parse_number(text: &str) -> Option<String> {
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.strip_prefix('+').unwrap_or(text)),
    };
    if body.is_empty() {
        return None;
    }
    if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        let value = i64::from_str_radix(hex, 16).ok()?;
        return Some(format!("{}{}", sign, value));
    }

    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let mut prev = ' ';
    for ch in body.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot && !seen_exp => seen_dot = true,
            'e' | 'E' if seen_digit && !seen_exp => seen_exp = true,
            '+' | '-' if prev == 'e' || prev == 'E' => {}
            _ => return None,
        }
        prev = ch;
    }
    if !seen_digit || prev == 'e' || prev == 'E' || prev == '+' || prev == '-' {
        return None;
    }
    Some(format!("{}{}", sign, body))
}

/// Parse a single SQL quoted literal with doubled-quote escaping.
fn parse_quoted(text: &str, quote: char) -> Option<String> {
    let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == quote {
            // Only doubled quotes may appear inside
            if chars.next() != Some(quote) {
                return None;
            }
        }
        out.push(ch);
    }
    Some(out)
}

/// Target column descriptors for one table, aligned with its source columns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableMapping {
    pub table: String,
    pub columns: Vec<ColumnMapping>,
}

impl TableMapping {
    pub fn column(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnMapping> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Target descriptors for the whole schema, aligned with `SchemaModel::tables`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchemaMapping {
    pub tables: Vec<TableMapping>,
}

impl SchemaMapping {
    pub fn table(&self, name: &str) -> Option<&TableMapping> {
        self.tables
            .iter()
            .find(|t| t.table == name)
            .or_else(|| self.tables.iter().find(|t| t.table.eq_ignore_ascii_case(name)))
    }

    fn table_mut(&mut self, name: &str) -> Option<&mut TableMapping> {
        self.tables
            .iter_mut()
            .find(|t| t.table.eq_ignore_ascii_case(name))
    }
}

/// Map every column of the schema, recording mapping warnings in the report,
/// then reconcile foreign key column types.
pub fn map_schema(
    mapper: &dyn TypeMapper,
    schema: &SchemaModel,
    report: &ReportHandle,
) -> SchemaMapping {
    let mut mapping = SchemaMapping {
        tables: schema
            .tables
            .iter()
            .map(|table| TableMapping {
                table: table.name.clone(),
                columns: table
                    .columns
                    .iter()
                    .map(|col| {
                        let mapped = mapper.map_column(col);
                        for w in &mapped.warnings {
                            report.warn(w.kind, Some(&table.name), w.message.clone());
                        }
                        mapped
                    })
                    .collect(),
            })
            .collect(),
    };
    reconcile_foreign_keys(schema, &mut mapping, report);
    mapping
}

/// Make every foreign key child column use its parent column's target type.
///
/// Chains (a → b → c) are followed until no column changes. Text keys mapped to
/// LONGTEXT cannot carry a foreign key in MySQL, so such pairs are narrowed to
/// VARCHAR(255) when observed data allows it.
pub fn reconcile_foreign_keys(
    schema: &SchemaModel,
    mapping: &mut SchemaMapping,
    report: &ReportHandle,
) {
    // Narrow unbounded text keys first so children copy the narrowed type
    for fk in schema.foreign_keys() {
        for (child_col, parent_col) in fk.columns.iter().zip(&fk.ref_columns) {
            let fits = [(&fk.ref_table, parent_col), (&fk.table, child_col)]
                .iter()
                .all(|(table, col)| {
                    schema
                        .table(table)
                        .and_then(|t| t.column(col))
                        .and_then(|c| c.stats.as_ref())
                        .and_then(|s| s.max_length)
                        .map_or(true, |max| max <= KEY_VARCHAR_LENGTH)
                });
            let Some(parent) = mapping
                .table_mut(&fk.ref_table)
                .and_then(|t| t.column_mut(parent_col))
            else {
                continue;
            };
            if parent.target_type == "LONGTEXT" && parent.family == TypeFamily::Text {
                if fits {
                    parent.target_type = format!("VARCHAR({})", KEY_VARCHAR_LENGTH);
                    report.warn(
                        WarningKind::Ddl,
                        Some(&fk.ref_table),
                        format!(
                            "column {} narrowed to VARCHAR({}) so it can be referenced by {}",
                            parent_col,
                            KEY_VARCHAR_LENGTH,
                            fk.describe()
                        ),
                    );
                } else {
                    report.warn(
                        WarningKind::Ddl,
                        Some(&fk.table),
                        format!(
                            "foreign key {} is on text longer than {} characters and will be rejected by InnoDB",
                            fk.describe(),
                            KEY_VARCHAR_LENGTH
                        ),
                    );
                }
            }
        }
    }

    let max_rounds = schema.tables.len() + 1;
    for _ in 0..max_rounds {
        let mut changed = false;
        for fk in schema.foreign_keys() {
            for (child_col, parent_col) in fk.columns.iter().zip(&fk.ref_columns) {
                let Some(parent) = mapping
                    .table(&fk.ref_table)
                    .and_then(|t| t.column(parent_col))
                    .map(|c| (c.target_type.clone(), c.family))
                else {
                    continue;
                };
                let Some(child) = mapping
                    .table_mut(&fk.table)
                    .and_then(|t| t.column_mut(child_col))
                else {
                    continue;
                };
                if child.target_type != parent.0 {
                    debug!(
                        "{}.{}: {} -> {} to match {}.{}",
                        fk.table, child_col, child.target_type, parent.0, fk.ref_table, parent_col
                    );
                    child.target_type = parent.0;
                    child.family = parent.1;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::test_support::*;
    use crate::core::schema::ColumnStats;

    fn mapper() -> SqliteToMysqlMapper {
        SqliteToMysqlMapper::new(MysqlVersion::parse("8.0").unwrap())
    }

    fn with_stats(mut col: Column, min: i64, max: i64, len: Option<i64>) -> Column {
        col.stats = Some(ColumnStats {
            max_length: len,
            min_int: Some(min),
            max_int: Some(max),
        });
        col
    }

    #[test]
    fn test_mapper_dialects() {
        let m = mapper();
        assert_eq!(m.source_dialect(), "sqlite");
        assert_eq!(m.target_dialect(), "mysql");
    }

    #[test]
    fn test_integer_types() {
        let m = mapper();
        assert_eq!(m.map_type(&make_test_column("a", "INTEGER")).target_type, "INT");
        assert_eq!(m.map_type(&make_test_column("a", "BIGINT")).target_type, "BIGINT");
        assert_eq!(
            m.map_type(&make_test_column("a", "UNSIGNED BIG INT")).target_type,
            "BIGINT"
        );
        assert_eq!(m.map_type(&make_test_column("a", "INT8")).target_type, "BIGINT");
        assert_eq!(m.map_type(&make_test_column("a", "SMALLINT")).target_type, "SMALLINT");

        let wide = with_stats(make_test_column("a", "INTEGER"), 0, 5_000_000_000, None);
        assert_eq!(m.map_type(&wide).target_type, "BIGINT");

        let overflowing = with_stats(make_test_column("a", "TINYINT"), 0, 1000, None);
        assert_eq!(m.map_type(&overflowing).target_type, "INT");
    }

    #[test]
    fn test_rowid_and_autoincrement_widen() {
        let m = mapper();
        let mut col = make_pk_column("id", "INTEGER");
        col.is_rowid_alias = true;
        assert_eq!(m.map_type(&col).target_type, "BIGINT");
        assert!(!m.map_column(&col).auto_increment);

        col.is_autoincrement = true;
        let mapped = m.map_column(&col);
        assert_eq!(mapped.target_type, "BIGINT");
        assert!(mapped.auto_increment);
        assert!(!mapped.is_nullable);
    }

    #[test]
    fn test_boolean_heuristic() {
        let m = mapper();
        let mut col = make_test_column("active", "INTEGER");
        col.default = Some("0".to_string());
        let mapped = m.map_column(&col);
        assert_eq!(mapped.target_type, "TINYINT(1)");
        assert_eq!(mapped.confidence, Confidence::Low);
        assert_eq!(mapped.warnings[0].kind, WarningKind::LowConfidence);
        assert_eq!(mapped.default.as_deref(), Some("0"));

        // observed values outside {0,1} defeat the heuristic
        let col = with_stats(col, 0, 7, None);
        assert_eq!(m.map_type(&col).target_type, "INT");

        let mut off = SqliteToMysqlMapper::new(MysqlVersion::new(8, 0, 30));
        off.infer_booleans = false;
        let mut col = make_test_column("active", "INTEGER");
        col.default = Some("1".to_string());
        assert_eq!(off.map_type(&col).target_type, "INT");
    }

    #[test]
    fn test_text_types() {
        let m = mapper();
        assert_eq!(
            m.map_type(&make_test_column("a", "VARCHAR(100)")).target_type,
            "VARCHAR(100)"
        );
        assert_eq!(
            m.map_type(&make_test_column("a", "VARCHAR(1000)")).target_type,
            "LONGTEXT"
        );
        assert_eq!(m.map_type(&make_test_column("a", "TEXT")).target_type, "LONGTEXT");
        assert_eq!(m.map_type(&make_pk_column("code", "TEXT")).target_type, "VARCHAR(255)");

        let overflow = with_stats(make_test_column("a", "VARCHAR(10)"), 0, 0, Some(40));
        let mapping = m.map_type(&overflow);
        assert_eq!(mapping.target_type, "LONGTEXT");
        assert!(mapping.is_lossy);
    }

    #[test]
    fn test_real_blob_numeric() {
        let m = mapper();
        assert_eq!(m.map_type(&make_test_column("a", "REAL")).target_type, "DOUBLE");
        assert_eq!(m.map_type(&make_test_column("a", "FLOAT")).target_type, "DOUBLE");
        assert_eq!(m.map_type(&make_test_column("a", "BLOB")).target_type, "LONGBLOB");
        assert_eq!(
            m.map_type(&make_test_column("a", "DECIMAL(12,4)")).target_type,
            "DECIMAL(12,4)"
        );
        assert_eq!(m.map_type(&make_test_column("a", "NUMERIC")).target_type, "DECIMAL(10,2)");
        assert_eq!(m.map_type(&make_test_column("a", "DECIMAL(8)")).target_type, "DECIMAL(8,0)");
        let clamped = m.map_type(&make_test_column("a", "DECIMAL(80,40)"));
        assert_eq!(clamped.target_type, "DECIMAL(65,30)");
        assert!(clamped.is_lossy);
        assert_eq!(m.map_type(&make_test_column("a", "BOOLEAN")).target_type, "TINYINT(1)");
        assert_eq!(m.map_type(&make_test_column("a", "DATETIME")).target_type, "DATETIME");
        assert_eq!(m.map_type(&make_test_column("a", "TIMESTAMP")).target_type, "DATETIME");
        assert_eq!(m.map_type(&make_test_column("a", "DATE")).family, TypeFamily::Date);
        assert_eq!(m.map_type(&make_test_column("a", "JSON")).target_type, "JSON");
    }

    #[test]
    fn test_json_on_old_target() {
        let m = SqliteToMysqlMapper::new(MysqlVersion::new(5, 6, 40));
        let mapping = m.map_type(&make_test_column("doc", "JSON"));
        assert_eq!(mapping.target_type, "LONGTEXT");
        assert!(mapping.is_lossy);
    }

    #[test]
    fn test_fallbacks_are_total() {
        let m = mapper();
        for declared in ["", "GEOMETRY", "MONEY", "WHATEVER(3)"] {
            let mapping = m.map_type(&make_test_column("a", declared));
            assert_eq!(mapping.target_type, "LONGTEXT");
            assert_eq!(mapping.warning.unwrap().kind, WarningKind::TypeFallback);
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let m = mapper();
        let mut col = make_test_column("created", "DATETIME");
        col.default = Some("CURRENT_TIMESTAMP".to_string());
        let a = m.map_column(&col);
        let b = m.map_column(&col);
        assert_eq!(a.target_type, b.target_type);
        assert_eq!(a.default, b.default);
    }

    #[test]
    fn test_default_translation() {
        let m = mapper();
        let mut col = make_test_column("created", "DATETIME");
        col.default = Some("(datetime('now'))".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("CURRENT_TIMESTAMP"));

        let mut col = make_test_column("day", "DATE");
        col.default = Some("CURRENT_DATE".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("(CURRENT_DATE)"));

        let mut col = make_test_column("name", "VARCHAR(20)");
        col.default = Some("'it''s'".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("'it\\'s'"));

        let mut col = make_test_column("n", "REAL");
        col.default = Some("-1.5e3".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("-1.5e3"));

        let mut col = make_test_column("n", "INTEGER");
        col.default = Some("0x10".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("16"));

        let mut col = make_test_column("b", "BOOLEAN");
        col.default = Some("TRUE".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("1"));

        let mut col = make_test_column("n", "VARCHAR(10)");
        col.default = Some("NULL".to_string());
        assert_eq!(m.map_column(&col).default.as_deref(), Some("NULL"));
        col.is_nullable = false;
        assert_eq!(m.map_column(&col).default, None);
    }

    #[test]
    fn test_default_on_text_columns_by_version() {
        let mut col = make_test_column("note", "TEXT");
        col.default = Some("'none'".to_string());

        let new = mapper();
        assert_eq!(new.map_column(&col).default.as_deref(), Some("('none')"));

        let old = SqliteToMysqlMapper::new(MysqlVersion::new(5, 7, 30));
        let mapped = old.map_column(&col);
        assert_eq!(mapped.default, None);
        assert_eq!(mapped.warnings[0].kind, WarningKind::DefaultValue);

        let mut col = make_test_column("day", "DATE");
        col.default = Some("CURRENT_DATE".to_string());
        assert_eq!(old.map_column(&col).default, None);
    }

    #[test]
    fn test_unrecognized_default_passthrough() {
        let m = mapper();
        let mut col = make_test_column("r", "INTEGER");
        col.default = Some("(abs(random()) % 10)".to_string());
        let mapped = m.map_column(&col);
        assert_eq!(mapped.default.as_deref(), Some("(abs(random()) % 10)"));
        assert_eq!(mapped.warnings[0].kind, WarningKind::DefaultValue);
    }

    #[test]
    fn test_default_value_parse() {
        assert_eq!(DefaultValue::parse("((1))"), DefaultValue::Number("1".into()));
        assert_eq!(DefaultValue::parse("X'0aFF'"), DefaultValue::Blob("0AFF".into()));
        assert_eq!(DefaultValue::parse("\"dq\""), DefaultValue::String("dq".into()));
        assert_eq!(
            DefaultValue::parse("(1) + (2)"),
            DefaultValue::Expression("(1) + (2)".into())
        );
        assert_eq!(
            DefaultValue::parse("'a' || 'b'"),
            DefaultValue::Expression("'a' || 'b'".into())
        );
        assert_eq!(
            DefaultValue::parse("strftime('%s', 'now')"),
            DefaultValue::Now(NowKind::Timestamp)
        );
        assert_eq!(DefaultValue::parse("1e"), DefaultValue::Expression("1e".into()));
    }

    #[test]
    fn test_map_schema_reconciles_fk_types() {
        let report = ReportHandle::new();
        let mut parent_id = make_pk_column("id", "INTEGER");
        parent_id.is_rowid_alias = true;
        let parent = make_test_table("parent", vec![parent_id]);

        let mut child = make_test_table(
            "child",
            vec![
                make_pk_column("id", "INTEGER"),
                make_test_column("parent_id", "INT"),
            ],
        );
        child.foreign_keys.push(make_fk("child", "parent_id", "parent", "id"));

        let mut grandchild = make_test_table(
            "grandchild",
            vec![make_test_column("child_parent", "SMALLINT")],
        );
        grandchild
            .foreign_keys
            .push(make_fk("grandchild", "child_parent", "child", "parent_id"));

        let schema = SchemaModel {
            tables: vec![grandchild, child, parent],
            ..Default::default()
        };
        let mapping = map_schema(&mapper(), &schema, &report);

        let child_col = mapping.table("child").unwrap().column("parent_id").unwrap();
        assert_eq!(child_col.target_type, "BIGINT");
        let gc_col = mapping
            .table("grandchild")
            .unwrap()
            .column("child_parent")
            .unwrap();
        assert_eq!(gc_col.target_type, "BIGINT");
    }

    #[test]
    fn test_reconcile_narrows_text_keys() {
        let report = ReportHandle::new();
        let mut code = make_test_column("code", "TEXT");
        code.pk_position = 0;
        let parent = make_test_table("parent", vec![code]);
        let mut child = make_test_table("child", vec![make_test_column("parent_code", "TEXT")]);
        child
            .foreign_keys
            .push(make_fk("child", "parent_code", "parent", "code"));
        let schema = SchemaModel {
            tables: vec![parent, child],
            ..Default::default()
        };

        let mapping = map_schema(&mapper(), &schema, &report);
        assert_eq!(
            mapping.table("parent").unwrap().column("code").unwrap().target_type,
            "VARCHAR(255)"
        );
        assert_eq!(
            mapping.table("child").unwrap().column("parent_code").unwrap().target_type,
            "VARCHAR(255)"
        );
        assert_eq!(report.snapshot().warnings_of(WarningKind::Ddl).count(), 1);
    }
}
