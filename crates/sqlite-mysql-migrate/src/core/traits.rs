//! Core traits for the migration engine.
//!
//! - [`SourceReader`]: Reads catalog rows and data from the source database
//! - [`Dialect`]: SQL syntax strategy for the target engine
//! - [`TypeMapper`]: Maps source column descriptors to target descriptors

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::report::WarningKind;

use super::catalog::{CatalogObject, ColumnInfo, ForeignKeyRow, IndexInfo};
use super::schema::{Affinity, Column, ColumnStats};
use super::value::Batch;

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Table name.
    pub table: String,
    /// Columns to read, in output order.
    pub columns: Vec<String>,
    /// Number of rows per batch.
    pub batch_size: usize,
    /// Batches buffered ahead of the consumer.
    pub channel_depth: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            table: String::new(),
            columns: Vec::new(),
            batch_size: 1000,
            channel_depth: 4,
        }
    }
}

/// Read-only access to a source database.
///
/// Catalog methods return raw rows; [`read_table`](SourceReader::read_table)
/// streams data through a bounded channel so large tables are never buffered
/// wholesale.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// All catalog objects in catalog order.
    async fn list_objects(&self) -> Result<Vec<CatalogObject>>;

    /// Column definitions of a table.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Indexes of a table.
    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    /// Key columns of an index; `None` for expression columns.
    async fn index_columns(&self, index: &str) -> Result<Vec<Option<String>>>;

    /// Foreign key rows of a table.
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRow>>;

    /// Exact row count of a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Observed value statistics of one column.
    async fn column_stats(
        &self,
        table: &str,
        column: &str,
        affinity: Affinity,
    ) -> Result<ColumnStats>;

    /// Start streaming rows from a table in source iteration order.
    ///
    /// The reader spawns a background task that fills the channel; a full
    /// channel blocks the cursor.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>>;

    /// Database type identifier (e.g., "sqlite").
    fn db_type(&self) -> &str;
}

/// SQL syntax strategy for a target dialect.
pub trait Dialect: Send + Sync {
    /// Dialect name (e.g., "mysql").
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Quote and escape a string literal.
    fn quote_string(&self, value: &str) -> String;

    /// Encode bytes as a literal.
    fn bytes_literal(&self, value: &[u8]) -> String;
}

/// Broad category of a target type, used for coercion and DDL decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Float,
    Text,
    Blob,
    DateTime,
    Date,
    Time,
    Year,
    Json,
}

impl TypeFamily {
    /// Types MySQL can only index with a key prefix.
    pub fn needs_index_prefix(&self) -> bool {
        matches!(self, TypeFamily::Text | TypeFamily::Blob)
    }

    /// Types eligible for FULLTEXT indexing.
    pub fn is_fulltext_eligible(&self) -> bool {
        matches!(self, TypeFamily::Text)
    }

    /// Types MySQL refuses plain literal defaults on before 8.0.13.
    pub fn needs_expression_default(&self) -> bool {
        matches!(self, TypeFamily::Text | TypeFamily::Blob | TypeFamily::Json)
    }
}

/// Confidence of a type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// A warning raised while mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl MappingWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Maps column definitions between a source and a target dialect.
///
/// Implementations are pure: the same column always yields the same mapping.
pub trait TypeMapper: Send + Sync {
    /// Get the source dialect name.
    fn source_dialect(&self) -> &str;

    /// Get the target dialect name.
    fn target_dialect(&self) -> &str;

    /// Map a column definition from source to target.
    fn map_column(&self, col: &Column) -> ColumnMapping;

    /// Map only the type of a column.
    ///
    /// Lower-level method used by `map_column`.
    fn map_type(&self, col: &Column) -> TypeMapping;
}

/// Result of mapping a column from source to target.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColumnMapping {
    /// Target column name.
    pub name: String,
    /// Source declared type, kept for plans and reports.
    pub source_type: String,
    /// Target data type string.
    pub target_type: String,
    /// Target type category.
    pub family: TypeFamily,
    /// Whether the column is nullable.
    pub is_nullable: bool,
    /// Rendered DEFAULT expression, if any.
    pub default: Option<String>,
    /// Emit AUTO_INCREMENT.
    pub auto_increment: bool,
    /// Mapping confidence.
    pub confidence: Confidence,
    /// Warnings raised while mapping.
    #[serde(skip)]
    pub warnings: Vec<MappingWarning>,
}

/// Result of mapping a type from source to target.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    /// Target type string (e.g., "VARCHAR(255)", "BIGINT").
    pub target_type: String,
    /// Target type category.
    pub family: TypeFamily,
    /// Whether this mapping is a fallback or heuristic.
    pub is_lossy: bool,
    /// Warning for lossy mappings.
    pub warning: Option<MappingWarning>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            target_type: target_type.into(),
            family,
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(
        target_type: impl Into<String>,
        family: TypeFamily,
        kind: WarningKind,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            family,
            is_lossy: true,
            warning: Some(MappingWarning::new(kind, warning)),
        }
    }
}
