//! SQLite source reader implementation.
//!
//! Implements the [`SourceReader`] trait over `rusqlite`. Catalog queries share
//! one read-only connection guarded by a mutex; every table cursor opens its
//! own connection on a blocking thread so cursors of different tables never
//! contend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::catalog::{
    CatalogObject, ColumnInfo, ForeignKeyRow, IndexInfo, IndexOrigin, ObjectKind,
};
use crate::core::schema::{Affinity, ColumnStats};
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::error::{MigrateError, Result};

/// SQLite source reader.
pub struct SqliteReader {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReader {
    /// Open a database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::open_connection(&path)?;
        info!("Opened SQLite source {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_connection(path: &Path) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(path, flags)?)
    }

    /// Quote an identifier for SQLite.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Run a catalog query on the shared connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| MigrateError::SchemaExtraction(format!("catalog task failed: {}", e)))?
    }

    fn convert_value(value: ValueRef<'_>) -> SqlValue<'static> {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => SqlValue::text_owned(s.to_string()),
                Err(_) => SqlValue::bytes_owned(bytes.to_vec()),
            },
            ValueRef::Blob(bytes) => SqlValue::bytes_owned(bytes.to_vec()),
        }
    }

    fn read_table_impl(
        path: &Path,
        opts: &ReadOptions,
        tx: &mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let conn = Self::open_connection(path)?;
        let col_list = opts
            .columns
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {} FROM {}",
            col_list,
            Self::quote_ident(&opts.table)
        );
        debug!("{}: {}", opts.table, query);

        let mut stmt = conn.prepare(&query)?;
        let col_count = opts.columns.len();
        let batch_size = opts.batch_size.max(1);
        let mut rows = stmt.query([])?;
        let mut buffer: Vec<Vec<SqlValue<'static>>> = Vec::with_capacity(batch_size);

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(col_count);
            for i in 0..col_count {
                values.push(Self::convert_value(row.get_ref(i)?));
            }
            buffer.push(values);

            if buffer.len() >= batch_size {
                let batch = Batch::new(std::mem::replace(
                    &mut buffer,
                    Vec::with_capacity(batch_size),
                ));
                if tx.blocking_send(Ok(batch)).is_err() {
                    // Consumer went away (cancelled)
                    return Ok(());
                }
            }
        }

        let _ = tx.blocking_send(Ok(Batch::new(buffer).mark_final()));
        Ok(())
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn list_objects(&self) -> Result<Vec<CatalogObject>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT type, name, tbl_name, sql FROM sqlite_master ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?;

            let mut objects = Vec::new();
            for row in rows {
                let (kind, name, table_name, sql) = row?;
                if let Some(kind) = ObjectKind::parse(&kind) {
                    objects.push(CatalogObject {
                        kind,
                        name,
                        table_name,
                        sql,
                    });
                }
            }
            Ok(objects)
        })
        .await
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT cid, name, type, \"notnull\", dflt_value, pk \
                 FROM pragma_table_info(?1) ORDER BY cid",
            )?;
            let rows = stmt.query_map([&table], |row| {
                Ok(ColumnInfo {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    not_null: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    pk: row.get::<_, i64>(5)?.max(0) as u32,
                })
            })?;
            let columns = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            if columns.is_empty() {
                return Err(MigrateError::SchemaExtraction(format!(
                    "table {} has no readable columns",
                    table
                )));
            }
            Ok(columns)
        })
        .await
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, \"unique\", origin, partial FROM pragma_index_list(?1) ORDER BY seq",
            )?;
            let rows = stmt.query_map([&table], |row| {
                Ok(IndexInfo {
                    name: row.get(0)?,
                    unique: row.get::<_, i64>(1)? != 0,
                    origin: IndexOrigin::parse(&row.get::<_, String>(2)?),
                    partial: row.get::<_, i64>(3)? != 0,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn index_columns(&self, index: &str) -> Result<Vec<Option<String>>> {
        let index = index.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT cid, name FROM pragma_index_info(?1) ORDER BY seqno")?;
            let rows = stmt.query_map([&index], |row| {
                let cid: i64 = row.get(0)?;
                let name: Option<String> = row.get(1)?;
                // cid -2 marks an expression column
                Ok(if cid == -2 { None } else { name })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRow>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, seq, \"table\", \"from\", \"to\", on_update, on_delete \
                 FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
            )?;
            let rows = stmt.query_map([&table], |row| {
                Ok(ForeignKeyRow {
                    id: row.get(0)?,
                    seq: row.get(1)?,
                    ref_table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                    on_update: row.get(5)?,
                    on_delete: row.get(6)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));
        self.with_conn(move |conn| Ok(conn.query_row(&query, [], |row| row.get(0))?))
            .await
    }

    async fn column_stats(
        &self,
        table: &str,
        column: &str,
        affinity: Affinity,
    ) -> Result<ColumnStats> {
        if matches!(affinity, Affinity::Blob | Affinity::Real) {
            return Ok(ColumnStats::default());
        }
        let col = Self::quote_ident(column);
        let query = format!(
            "SELECT MAX(CASE WHEN typeof({c}) = 'text' THEN length({c}) END), \
                    MIN(CASE WHEN typeof({c}) = 'integer' THEN {c} END), \
                    MAX(CASE WHEN typeof({c}) = 'integer' THEN {c} END) \
             FROM {t}",
            c = col,
            t = Self::quote_ident(table)
        );
        self.with_conn(move |conn| {
            Ok(conn.query_row(&query, [], |row| {
                Ok(ColumnStats {
                    max_length: row.get(0)?,
                    min_int: row.get(1)?,
                    max_int: row.get(2)?,
                })
            })?)
        })
        .await
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(opts.channel_depth.max(1));
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = Self::read_table_impl(&path, &opts, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}
