//! Type mapping between the source and target dialects.
//!
//! # Available Mappers
//!
//! - [`SqliteToMysqlMapper`]: SQLite → MySQL (fallbacks and heuristics are lossy)
//!
//! # Usage
//!
//! ```rust,ignore
//! let mapper = SqliteToMysqlMapper::from_config(&config.migration)?;
//! let mapping = map_schema(&mapper, &schema, &report);
//! let users = mapping.table("users");
//! ```

mod typemap;

pub use typemap::{map_schema, reconcile_foreign_keys, SchemaMapping, SqliteToMysqlMapper, TableMapping};
