//! Raw catalog rows as returned by a [`SourceReader`](super::traits::SourceReader).
//!
//! These mirror `sqlite_master` and the `PRAGMA` result sets one-to-one. The
//! introspector turns them into the [`schema`](super::schema) model.

use serde::{Deserialize, Serialize};

/// Kind of a `sqlite_master` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
    Index,
    Trigger,
}

impl ObjectKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "table" => Some(ObjectKind::Table),
            "view" => Some(ObjectKind::View),
            "index" => Some(ObjectKind::Index),
            "trigger" => Some(ObjectKind::Trigger),
            _ => None,
        }
    }
}

/// One `sqlite_master` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    pub kind: ObjectKind,
    pub name: String,
    pub table_name: String,
    /// CREATE statement; absent for autoindexes.
    pub sql: Option<String>,
}

impl CatalogObject {
    /// Internal SQLite bookkeeping object (`sqlite_sequence`, `sqlite_stat1`, ...).
    pub fn is_internal(&self) -> bool {
        self.name.to_ascii_lowercase().starts_with("sqlite_")
    }
}

/// One `PRAGMA table_info` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub cid: i32,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub pk: u32,
}

/// Why an index exists, from `PRAGMA index_list`'s `origin` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexOrigin {
    /// `CREATE INDEX`.
    Created,
    /// `UNIQUE` constraint autoindex.
    Unique,
    /// `PRIMARY KEY` constraint autoindex.
    PrimaryKey,
}

impl IndexOrigin {
    pub fn parse(origin: &str) -> Self {
        match origin {
            "u" => IndexOrigin::Unique,
            "pk" => IndexOrigin::PrimaryKey,
            _ => IndexOrigin::Created,
        }
    }
}

/// One `PRAGMA index_list` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub origin: IndexOrigin,
    pub partial: bool,
}

/// One `PRAGMA foreign_key_list` row. Composite keys span several rows
/// sharing an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRow {
    pub id: i64,
    pub seq: i64,
    pub ref_table: String,
    pub from: String,
    /// Parent column; `None` when the constraint omits the column list.
    pub to: Option<String>,
    pub on_update: String,
    pub on_delete: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_objects() {
        let obj = CatalogObject {
            kind: ObjectKind::Table,
            name: "sqlite_sequence".to_string(),
            table_name: "sqlite_sequence".to_string(),
            sql: None,
        };
        assert!(obj.is_internal());

        let obj = CatalogObject {
            name: "users".to_string(),
            ..obj
        };
        assert!(!obj.is_internal());
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(ObjectKind::parse("view"), Some(ObjectKind::View));
        assert_eq!(ObjectKind::parse("shadow"), None);
        assert_eq!(IndexOrigin::parse("pk"), IndexOrigin::PrimaryKey);
        assert_eq!(IndexOrigin::parse("c"), IndexOrigin::Created);
    }
}
