//! SQLite source driver.
//!
//! - [`SqliteReader`]: read-only catalog and data access over `rusqlite`

mod reader;

pub use reader::SqliteReader;
