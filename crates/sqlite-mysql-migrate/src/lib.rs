//! # sqlite-mysql-migrate
//!
//! SQLite to MySQL migration library.
//!
//! The library reads a SQLite database and produces a self-contained MySQL
//! script with:
//!
//! - **Type mapping** from SQLite affinities and declared types to MySQL types
//! - **Dependency ordering** so parents are created and loaded before children
//! - **Trigger translation** into MySQL `CREATE TRIGGER` blocks
//! - **Parallel, ordered streaming** of rows as multi-row INSERT statements
//! - **Blob externalization** to files referenced with `LOAD_FILE`
//! - **A migration report** with row-count verification
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlite_mysql_migrate::{CancellationToken, Config, Orchestrator, SqliteReader, WriterSink};
//!
//! #[tokio::main]
//! async fn main() -> sqlite_mysql_migrate::Result<()> {
//!     let config = Config::for_source("app.db");
//!     let source = Arc::new(SqliteReader::open("app.db")?);
//!     let orchestrator = Orchestrator::new(config, source);
//!     let mut sink = WriterSink::new(std::fs::File::create("app_mysql.sql")?);
//!     let result = orchestrator.run(&mut sink, CancellationToken::new()).await?;
//!     println!("Emitted {} rows", result.rows_emitted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod emitter;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod source;
pub mod transfer;
pub mod trigger;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, ExportMode, MigrationConfig, OutputConfig, SourceConfig};
pub use drivers::{MysqlVersion, SqliteReader};
pub use emitter::{ScriptSink, WriterSink};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationPlan, MigrationResult, Orchestrator};
pub use report::{MigrationReport, WarningKind};
pub use tokio_util::sync::CancellationToken;
