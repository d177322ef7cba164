//! Core abstractions shared by every stage of the migration.
//!
//! - [`schema`]: Immutable source schema model (tables, columns, keys, triggers, views)
//! - [`catalog`]: Raw catalog rows returned by source readers
//! - [`value`]: SQL value representation with efficient memory usage
//! - [`traits`]: Core traits for readers, dialects, and type mappers
//! - [`identifier`]: Identifier validation, shortening, and quoting
//!
//! # Architecture
//!
//! The core module defines the seams implemented by `drivers/` (the SQLite
//! reader and the MySQL dialect) and `dialect/` (the type mapper). Components
//! downstream of introspection only ever see these types.

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use catalog::{CatalogObject, ColumnInfo, ForeignKeyRow, IndexInfo, IndexOrigin, ObjectKind};
pub use schema::{
    Affinity, Column, ColumnStats, ForeignKey, Index, IndexKind, ReferentialAction, SchemaModel,
    Table, TableOptions, Trigger, TriggerEvent, TriggerTiming, View,
};
pub use traits::{
    ColumnMapping, Confidence, Dialect, MappingWarning, ReadOptions, SourceReader, TypeFamily,
    TypeMapper, TypeMapping,
};
pub use value::{Batch, SqlValue};
