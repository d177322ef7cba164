//! Schema model for the source database: tables, columns, indexes, foreign keys,
//! triggers, and views.
//!
//! The model is built once by the [`SchemaIntrospector`](crate::source::SchemaIntrospector)
//! and shared read-only (behind an `Arc`) by every downstream component. Target
//! types, translated triggers, and DDL live in separate output structures and are
//! never written back here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MigrateError, Result};

/// SQLite type affinity, resolved once from the declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Affinity {
    Integer,
    Text,
    Real,
    Numeric,
    Blob,
    /// No declared type at all.
    Unknown,
}

impl Affinity {
    /// Resolve affinity using SQLite's column affinity rules (section 3.1 of the
    /// SQLite datatype documentation), applied in order.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Affinity::Unknown;
        }
        if upper.contains("INT") {
            return Affinity::Integer;
        }
        if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            return Affinity::Text;
        }
        if upper.contains("BLOB") {
            return Affinity::Blob;
        }
        if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            return Affinity::Real;
        }
        Affinity::Numeric
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Text => "TEXT",
            Affinity::Real => "REAL",
            Affinity::Numeric => "NUMERIC",
            Affinity::Blob => "BLOB",
            Affinity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed value statistics for a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Longest text value, in characters.
    pub max_length: Option<i64>,
    /// Smallest integer value.
    pub min_int: Option<i64>,
    /// Largest integer value.
    pub max_int: Option<i64>,
}

impl ColumnStats {
    /// Whether every observed integer lies within `[min, max]`.
    /// Columns without observed integers trivially fit.
    pub fn int_range_within(&self, min: i64, max: i64) -> bool {
        self.min_int.map_or(true, |v| v >= min) && self.max_int.map_or(true, |v| v <= max)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type string exactly as written in CREATE TABLE (may be empty).
    pub declared_type: String,

    /// Affinity resolved from the declared type.
    pub affinity: Affinity,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Raw default expression, if any.
    pub default: Option<String>,

    /// 1-based position within the primary key, 0 when not part of it.
    pub pk_position: u32,

    /// Sole `INTEGER PRIMARY KEY` column of a rowid table.
    pub is_rowid_alias: bool,

    /// Declared with `AUTOINCREMENT`.
    pub is_autoincrement: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,

    /// Sampled statistics, when collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ColumnStats>,
}

impl Column {
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }

    /// Declared length from e.g. `VARCHAR(120)`.
    pub fn declared_length(&self) -> Option<u32> {
        let (first, _) = self.declared_args()?;
        first
    }

    /// Declared precision/scale from e.g. `DECIMAL(12,4)`.
    pub fn declared_precision(&self) -> Option<(u32, Option<u32>)> {
        let (first, second) = self.declared_args()?;
        first.map(|p| (p, second))
    }

    fn declared_args(&self) -> Option<(Option<u32>, Option<u32>)> {
        let open = self.declared_type.find('(')?;
        let close = self.declared_type[open..].find(')')? + open;
        let mut parts = self.declared_type[open + 1..close]
            .split(',')
            .map(|p| p.trim().parse::<u32>().ok());
        let first = parts.next().flatten();
        let second = parts.next().flatten();
        Some((first, second))
    }

    /// Declared type name without its arguments, uppercased.
    pub fn base_type(&self) -> String {
        let base = match self.declared_type.find('(') {
            Some(pos) => &self.declared_type[..pos],
            None => &self.declared_type,
        };
        base.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase()
    }
}

/// Index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Regular,
    Unique,
    Fulltext,
}

/// Index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Owning table.
    pub table: String,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,

    /// Index kind.
    pub kind: IndexKind,
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Parse the action string reported by `PRAGMA foreign_key_list`.
    pub fn parse(action: &str) -> Self {
        match action.trim().to_ascii_uppercase().as_str() {
            "RESTRICT" => ReferentialAction::Restrict,
            "CASCADE" => ReferentialAction::Cascade,
            "SET NULL" => ReferentialAction::SetNull,
            "SET DEFAULT" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// 0-based declaration order within the owning table.
    pub ordinal: usize,

    /// Owning (child) table.
    pub table: String,

    /// Child column names.
    pub columns: Vec<String>,

    /// Referenced (parent) table.
    pub ref_table: String,

    /// Referenced column names, pairwise with `columns`.
    pub ref_columns: Vec<String>,

    /// ON DELETE action.
    pub on_delete: ReferentialAction,

    /// ON UPDATE action.
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    pub fn is_self_referencing(&self) -> bool {
        self.table.eq_ignore_ascii_case(&self.ref_table)
    }

    /// Human-readable `child(cols) -> parent(cols)` label.
    pub fn describe(&self) -> String {
        format!(
            "{}({}) -> {}({})",
            self.table,
            self.columns.join(", "),
            self.ref_table,
            self.ref_columns.join(", ")
        )
    }
}

/// Per-table storage clauses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableOptions {
    pub engine: String,
    pub charset: String,
    pub collation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablespace: Option<String>,
}

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name (unique within the model).
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,

    /// Secondary indexes.
    pub indexes: Vec<Index>,

    /// Foreign key constraints, in declaration order.
    pub foreign_keys: Vec<ForeignKey>,

    /// Row count from `SELECT COUNT(*)`.
    pub row_count: i64,

    /// Declared `WITHOUT ROWID`.
    pub without_rowid: bool,

    /// FTS virtual table.
    pub full_text: bool,

    /// Position in the source catalog.
    pub catalog_pos: usize,

    /// Storage clauses for CREATE TABLE.
    pub options: TableOptions,
}

impl Table {
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Find a column by name (SQLite identifiers are case-insensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Indices of primary key columns within `columns`, in key order.
    pub fn pk_indices(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|pk| self.column_index(pk))
            .collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Trigger firing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
        }
    }
}

/// Trigger metadata with its body split into statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    /// Columns of an `UPDATE OF` clause.
    pub update_of: Vec<String>,
    /// `WHEN` condition text.
    pub when: Option<String>,
    /// Body statements without trailing semicolons.
    pub body: Vec<String>,
    /// Original CREATE TRIGGER text.
    pub sql: String,
}

/// View metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    /// Explicit column names from `CREATE VIEW v (a, b)`; empty when absent.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Defining SELECT text.
    pub query: String,
}

/// Complete source schema. Immutable once introspection completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Tables in catalog order.
    pub tables: Vec<Table>,
    pub views: Vec<View>,
    pub triggers: Vec<Trigger>,
}

impl SchemaModel {
    /// Find a table by name, exact match first, then case-insensitive.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.table_index(name).map(|i| &self.tables[i])
    }

    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name).or_else(|| {
            self.tables
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    /// Every foreign key in declaration order (table catalog order, then
    /// declaration order within the table).
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.tables.iter().flat_map(|t| t.foreign_keys.iter())
    }

    /// Whether any foreign key references or is owned by the table.
    pub fn has_fk_involvement(&self, table: &str) -> bool {
        self.foreign_keys().any(|fk| {
            fk.table.eq_ignore_ascii_case(table) || fk.ref_table.eq_ignore_ascii_case(table)
        })
    }

    /// Check referential integrity of the model itself: every foreign key must
    /// point at an existing table and existing columns on both sides.
    pub fn validate(&self) -> Result<()> {
        for fk in self.foreign_keys() {
            let child = self.table(&fk.table).ok_or_else(|| {
                MigrateError::SchemaValidation(format!("foreign key owner {} missing", fk.table))
            })?;
            let parent = self.table(&fk.ref_table).ok_or_else(|| {
                MigrateError::SchemaValidation(format!(
                    "foreign key {} references missing table {}",
                    fk.describe(),
                    fk.ref_table
                ))
            })?;
            if fk.columns.is_empty() || fk.columns.len() != fk.ref_columns.len() {
                return Err(MigrateError::SchemaValidation(format!(
                    "foreign key {} has mismatched column lists",
                    fk.describe()
                )));
            }
            for col in &fk.columns {
                if child.column(col).is_none() {
                    return Err(MigrateError::SchemaValidation(format!(
                        "foreign key {} uses missing column {}.{}",
                        fk.describe(),
                        child.name,
                        col
                    )));
                }
            }
            for col in &fk.ref_columns {
                if parent.column(col).is_none() {
                    return Err(MigrateError::SchemaValidation(format!(
                        "foreign key {} references missing column {}.{}",
                        fk.describe(),
                        parent.name,
                        col
                    )));
                }
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_affinity_rules() {
        assert_eq!(Affinity::from_declared("INTEGER"), Affinity::Integer);
        assert_eq!(Affinity::from_declared("unsigned big int"), Affinity::Integer);
        assert_eq!(Affinity::from_declared("VARCHAR(255)"), Affinity::Text);
        assert_eq!(Affinity::from_declared("CLOB"), Affinity::Text);
        assert_eq!(Affinity::from_declared("BLOB"), Affinity::Blob);
        assert_eq!(Affinity::from_declared("DOUBLE PRECISION"), Affinity::Real);
        assert_eq!(Affinity::from_declared("FLOAT"), Affinity::Real);
        assert_eq!(Affinity::from_declared("DECIMAL(10,5)"), Affinity::Numeric);
        assert_eq!(Affinity::from_declared("DATETIME"), Affinity::Numeric);
        assert_eq!(Affinity::from_declared(""), Affinity::Unknown);
        // "INT" wins over "CHAR" per rule order
        assert_eq!(Affinity::from_declared("CHARINT"), Affinity::Integer);
        // "POINT" contains "INT"
        assert_eq!(Affinity::from_declared("FLOATING POINT"), Affinity::Integer);
    }

    #[test]
    fn test_declared_args() {
        let col = make_test_column("price", "DECIMAL(12, 4)");
        assert_eq!(col.declared_precision(), Some((12, Some(4))));
        assert_eq!(col.base_type(), "DECIMAL");

        let col = make_test_column("name", "varchar(80)");
        assert_eq!(col.declared_length(), Some(80));
        assert_eq!(col.base_type(), "VARCHAR");

        let col = make_test_column("note", "TEXT");
        assert_eq!(col.declared_length(), None);
    }

    #[test]
    fn test_stats_range() {
        let stats = ColumnStats {
            max_length: None,
            min_int: Some(0),
            max_int: Some(1),
        };
        assert!(stats.int_range_within(0, 1));
        assert!(!stats.int_range_within(1, 1));
        assert!(ColumnStats::default().int_range_within(0, 1));
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse("set null"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("NO ACTION"), ReferentialAction::NoAction);
        assert_eq!(ReferentialAction::parse(""), ReferentialAction::NoAction);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let parent = make_test_table("parent", vec![make_pk_column("id", "INTEGER")]);
        let mut child = make_test_table(
            "child",
            vec![
                make_pk_column("id", "INTEGER"),
                make_test_column("parent_id", "INTEGER"),
            ],
        );
        child.foreign_keys.push(make_fk("child", "parent_id", "parent", "id"));
        let model = SchemaModel {
            tables: vec![parent, child],
            ..Default::default()
        };
        assert!(model.validate().is_ok());
        assert!(model.has_fk_involvement("parent"));
        assert!(model.has_fk_involvement("CHILD"));
    }

    #[test]
    fn test_validate_rejects_dangling_table() {
        let mut child = make_test_table("child", vec![make_test_column("parent_id", "INTEGER")]);
        child.foreign_keys.push(make_fk("child", "parent_id", "missing", "id"));
        let model = SchemaModel {
            tables: vec![child],
            ..Default::default()
        };
        let err = model.validate().unwrap_err();
        assert!(matches!(err, MigrateError::SchemaValidation(_)));
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let parent = make_test_table("parent", vec![make_pk_column("id", "INTEGER")]);
        let mut child = make_test_table("child", vec![make_test_column("parent_id", "INTEGER")]);
        child.foreign_keys.push(make_fk("child", "parent_id", "parent", "uuid"));
        let model = SchemaModel {
            tables: vec![parent, child],
            ..Default::default()
        };
        assert!(model.validate().is_err());
    }
}
