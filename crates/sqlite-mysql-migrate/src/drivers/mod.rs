//! Database driver implementations.
//!
//! - [`sqlite`]: source reader (catalog + row cursors)
//! - [`mysql`]: target dialect (quoting, literals, version gates)
//!
//! # Architecture
//!
//! The source side implements [`SourceReader`](crate::core::traits::SourceReader)
//! and the target side implements [`Dialect`](crate::core::traits::Dialect).
//! Nothing ever connects to a target server; the MySQL driver only knows how
//! to spell things.

pub mod mysql;
pub mod sqlite;

pub use mysql::{MysqlDialect, MysqlVersion};
pub use sqlite::SqliteReader;
