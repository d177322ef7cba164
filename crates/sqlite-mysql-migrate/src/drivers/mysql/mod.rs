//! MySQL/MariaDB target dialect.
//!
//! - [`MysqlDialect`]: identifier quoting and literal encoding
//! - [`MysqlVersion`]: target server version and the DDL features it gates
//!
//! # Supported Versions
//!
//! - MySQL 5.5+ (FULLTEXT on InnoDB needs 5.6, JSON needs 5.7.8,
//!   expression defaults need 8.0.13)
//! - MariaDB 10.2+ (treated as MySQL 5.7)

mod dialect;
mod version;

pub use dialect::MysqlDialect;
pub use version::MysqlVersion;
