//! Batched data pipeline.
//!
//! Each table gets its own worker: a source cursor feeding a blocking encoder
//! that turns every batch into one multi-row `INSERT`, externalizing oversized
//! blobs on the way. Finished statements travel through a bounded channel per
//! table, and the driver drains those channels strictly in resolved order, so
//! the script is identical regardless of how many workers run.
//!
//! Tables are scheduled in runs of consecutive tables that share a dependency
//! level; within a run up to `workers` tables stream concurrently.

mod blob;
mod literal;

pub use blob::{encode_component, row_key, BlobExternalization, BlobStore, FsBlobStore};
pub use literal::encode_value;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MigrationConfig;
use crate::core::identifier::quote_mysql;
use crate::core::schema::{SchemaModel, Table};
use crate::core::traits::{Dialect, ReadOptions, SourceReader, TypeFamily};
use crate::core::value::{Batch, SqlValue};
use crate::dialect::{SchemaMapping, TableMapping};
use crate::drivers::mysql::MysqlDialect;
use crate::error::{MigrateError, Result};
use crate::report::{ReportHandle, WarningKind};
use crate::resolver::ResolvedOrder;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Rows per INSERT statement.
    pub batch_size: usize,
    /// Largest blob still inlined, in bytes.
    pub max_blob_size: usize,
    /// Tables streamed concurrently.
    pub workers: usize,
    /// Statements buffered per table worker.
    pub read_ahead: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_blob_size: 1_048_576,
            workers: 2,
            read_ahead: 4,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_blob_size: config.max_blob_size,
            workers: config.get_workers().max(1),
            read_ahead: config.get_read_ahead().max(1),
        }
    }
}

/// One finished INSERT statement.
#[derive(Debug, Clone)]
pub struct InsertBatch {
    pub table: String,
    pub sql: String,
    /// Rows covered by the statement.
    pub rows: usize,
    /// Blob values written to external files for these rows.
    pub blobs: usize,
}

/// Totals of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Tables streamed to completion.
    pub tables_completed: usize,
    pub rows: i64,
    pub blobs: i64,
    /// Whether the run stopped on the cancellation token.
    pub cancelled: bool,
}

/// What a table worker reports back once it stops.
#[derive(Debug, Clone, Copy, Default)]
struct WorkerOutcome {
    rows: u64,
    cancelled: bool,
}

/// A started table: its statement stream and worker handle.
struct TableTask {
    table: String,
    statements: mpsc::Receiver<InsertBatch>,
    handle: JoinHandle<Result<WorkerOutcome>>,
    started: Instant,
}

/// Streams table data into INSERT statements.
pub struct DataPipeline {
    source: Arc<dyn SourceReader>,
    blobs: Option<Arc<dyn BlobStore>>,
    options: PipelineOptions,
}

impl DataPipeline {
    /// Create a pipeline that always inlines blobs.
    pub fn new(source: Arc<dyn SourceReader>, options: PipelineOptions) -> Self {
        Self {
            source,
            blobs: None,
            options,
        }
    }

    /// Create a pipeline from configuration, externalizing blobs to
    /// `blob_dir` when one is set.
    pub fn from_config(source: Arc<dyn SourceReader>, config: &MigrationConfig) -> Result<Self> {
        let mut pipeline = Self::new(source, PipelineOptions::from_config(config));
        if let Some(dir) = config.absolute_blob_dir()? {
            info!(
                "Externalizing blobs larger than {} bytes to {}",
                config.max_blob_size,
                dir.display()
            );
            pipeline.blobs = Some(Arc::new(FsBlobStore::new(dir, config.relative_blob_paths)));
        }
        Ok(pipeline)
    }

    /// Replace the blob destination.
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(store);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Stream every table in resolved order, handing each statement to `emit`.
    ///
    /// Rows are counted into the report only after `emit` accepted their
    /// statement, so after a cancellation the report holds exactly what
    /// reached the script.
    ///
    /// # Errors
    ///
    /// Source read failures and `emit` failures abort the run. Per-row
    /// problems (coercion, blob writes) are reported and substituted.
    pub async fn run<F>(
        &self,
        schema: &SchemaModel,
        mapping: &SchemaMapping,
        resolved: &ResolvedOrder,
        report: &ReportHandle,
        cancel: &CancellationToken,
        mut emit: F,
    ) -> Result<PipelineStats>
    where
        F: FnMut(&InsertBatch) -> Result<()>,
    {
        let mut stats = PipelineStats::default();
        let level_of: HashMap<&str, usize> = resolved
            .levels
            .iter()
            .enumerate()
            .flat_map(|(level, tables)| tables.iter().map(move |t| (t.as_str(), level)))
            .collect();

        info!(
            "Streaming {} tables (batch size {}, {} workers)",
            resolved.order.len(),
            self.options.batch_size,
            self.options.workers
        );

        for run in level_runs(&resolved.order, &level_of) {
            let mut queue = run.into_iter();
            let mut pending: VecDeque<TableTask> = VecDeque::new();

            loop {
                while pending.len() < self.options.workers && !cancel.is_cancelled() {
                    let Some(name) = queue.next() else { break };
                    let table = schema.table(name).ok_or_else(|| {
                        MigrateError::transfer(name, "table missing from schema model")
                    })?;
                    let table_mapping = mapping.table(name).ok_or_else(|| {
                        MigrateError::transfer(name, "table has no column mapping")
                    })?;
                    report.register_table(&table.name, table.row_count);
                    pending.push_back(self.spawn_table(table, table_mapping, report, cancel)?);
                }

                let Some(mut task) = pending.pop_front() else {
                    break;
                };
                while let Some(insert) = task.statements.recv().await {
                    emit(&insert)?;
                    report.add_emitted(&insert.table, insert.rows as i64, insert.blobs as i64);
                    stats.rows += insert.rows as i64;
                    stats.blobs += insert.blobs as i64;
                }
                let outcome = task.handle.await.map_err(|e| {
                    MigrateError::transfer(&task.table, format!("worker task failed: {}", e))
                })??;

                if outcome.cancelled {
                    stats.cancelled = true;
                    info!("{}: stopped after {} rows (cancelled)", task.table, outcome.rows);
                } else {
                    stats.tables_completed += 1;
                    log_throughput(&task.table, outcome.rows, task.started.elapsed());
                }
            }

            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
        }

        if stats.cancelled {
            report.set_cancelled();
        }
        Ok(stats)
    }

    fn spawn_table(
        &self,
        table: &Table,
        mapping: &TableMapping,
        report: &ReportHandle,
        cancel: &CancellationToken,
    ) -> Result<TableTask> {
        let encoder = RowEncoder::new(
            table,
            mapping,
            self.blobs.clone(),
            self.options.max_blob_size,
            report.clone(),
        )?;
        let rows = self.source.read_table(ReadOptions {
            table: table.name.clone(),
            columns: table.column_names(),
            batch_size: self.options.batch_size,
            channel_depth: self.options.read_ahead,
        });
        let (tx, statements) = mpsc::channel(self.options.read_ahead);
        let cancel = cancel.clone();
        debug!("{}: worker started", table.name);

        let handle = tokio::task::spawn_blocking(move || encoder.run(rows, tx, &cancel));
        Ok(TableTask {
            table: table.name.clone(),
            statements,
            handle,
            started: Instant::now(),
        })
    }
}

/// Split the resolved order into runs of consecutive tables on the same level.
fn level_runs<'a>(order: &'a [String], level_of: &HashMap<&str, usize>) -> Vec<Vec<&'a str>> {
    let mut runs: Vec<Vec<&str>> = Vec::new();
    let mut current_level = None;
    for name in order {
        let level = level_of.get(name.as_str()).copied();
        match runs.last_mut() {
            Some(run) if level == current_level => run.push(name),
            _ => runs.push(vec![name]),
        }
        current_level = level;
    }
    runs
}

fn log_throughput(table: &str, rows: u64, elapsed: Duration) {
    let rows_per_sec = if elapsed.as_secs_f64() > 0.0 {
        (rows as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    };
    info!(
        "{}: emitted {} rows in {:?} ({} rows/sec)",
        table, rows, elapsed, rows_per_sec
    );
}

/// Target-side view of one column.
#[derive(Debug, Clone)]
struct EncodedColumn {
    name: String,
    family: TypeFamily,
    nullable: bool,
}

/// Turns source batches of one table into INSERT statements.
struct RowEncoder {
    table: String,
    insert_prefix: String,
    columns: Vec<EncodedColumn>,
    pk_indices: Vec<usize>,
    blobs: Option<Arc<dyn BlobStore>>,
    max_blob_size: usize,
    dialect: MysqlDialect,
    report: ReportHandle,
}

impl RowEncoder {
    fn new(
        table: &Table,
        mapping: &TableMapping,
        blobs: Option<Arc<dyn BlobStore>>,
        max_blob_size: usize,
        report: ReportHandle,
    ) -> Result<Self> {
        let columns = table
            .columns
            .iter()
            .map(|col| {
                mapping
                    .column(&col.name)
                    .map(|m| EncodedColumn {
                        name: col.name.clone(),
                        family: m.family,
                        nullable: m.is_nullable,
                    })
                    .ok_or_else(|| {
                        MigrateError::transfer(
                            &table.name,
                            format!("column {} has no mapping", col.name),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let column_list = columns
            .iter()
            .map(|c| quote_mysql(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            table: table.name.clone(),
            insert_prefix: format!(
                "INSERT INTO {} ({}) VALUES\n",
                quote_mysql(&table.name),
                column_list
            ),
            columns,
            pk_indices: table.pk_indices(),
            blobs,
            max_blob_size,
            dialect: MysqlDialect::new(),
            report,
        })
    }

    /// Worker loop; runs on a blocking thread.
    fn run(
        self,
        mut rows: mpsc::Receiver<Result<Batch>>,
        tx: mpsc::Sender<InsertBatch>,
        cancel: &CancellationToken,
    ) -> Result<WorkerOutcome> {
        let mut outcome = WorkerOutcome::default();
        loop {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            let Some(next) = rows.blocking_recv() else {
                break;
            };
            let batch = next?;
            let is_last = batch.is_last;
            if !batch.is_empty() {
                let insert = self.encode_batch(&batch.rows, outcome.rows);
                outcome.rows += insert.rows as u64;
                if tx.blocking_send(insert).is_err() {
                    if cancel.is_cancelled() {
                        outcome.cancelled = true;
                        return Ok(outcome);
                    }
                    return Err(MigrateError::transfer(&self.table, "script writer stopped"));
                }
            }
            if is_last {
                break;
            }
        }
        Ok(outcome)
    }

    /// Encode one batch; `rows_before` is the number of rows already encoded.
    fn encode_batch(&self, rows: &[Vec<SqlValue<'static>>], rows_before: u64) -> InsertBatch {
        let mut sql = self.insert_prefix.clone();
        let mut blobs = 0;
        for (i, row) in rows.iter().enumerate() {
            let ordinal = rows_before + i as u64 + 1;
            if i > 0 {
                sql.push_str(",\n");
            }
            sql.push('(');
            for (c, value) in row.iter().enumerate() {
                if c > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&self.encode_cell(row, c, value, ordinal, &mut blobs));
            }
            sql.push(')');
        }
        sql.push(';');

        InsertBatch {
            table: self.table.clone(),
            sql,
            rows: rows.len(),
            blobs,
        }
    }

    fn encode_cell(
        &self,
        row: &[SqlValue<'static>],
        index: usize,
        value: &SqlValue<'static>,
        ordinal: u64,
        blobs: &mut usize,
    ) -> String {
        let Some(col) = self.columns.get(index) else {
            return "NULL".to_string();
        };

        if let Some(ref store) = self.blobs {
            let payload = match value {
                SqlValue::Bytes(b) if col.family == TypeFamily::Blob => Some(b.as_ref()),
                SqlValue::Text(s) if col.family == TypeFamily::Blob => Some(s.as_bytes()),
                _ => None,
            };
            if let Some(bytes) = payload.filter(|b| b.len() > self.max_blob_size) {
                let key = self.row_key(row, ordinal);
                return match store.store(&self.table, &col.name, &key, bytes) {
                    Ok(ext) => {
                        *blobs += 1;
                        format!("LOAD_FILE({})", self.dialect.quote_string(&ext.reference))
                    }
                    Err(e) => {
                        let substitute = placeholder(col);
                        error!(
                            "{}: blob write failed for row {} column {}: {}",
                            self.table, ordinal, col.name, e
                        );
                        self.report.warn(
                            WarningKind::BlobWrite,
                            Some(&self.table),
                            format!(
                                "row {} column {}: could not externalize {} bytes ({}); substituted {}",
                                ordinal,
                                col.name,
                                bytes.len(),
                                e,
                                substitute
                            ),
                        );
                        substitute.to_string()
                    }
                };
            }
        }

        if matches!(value, SqlValue::Null) && !col.nullable {
            self.report.warn(
                WarningKind::Coercion,
                Some(&self.table),
                format!(
                    "row {} column {}: NULL in a NOT NULL column; substituted DEFAULT",
                    ordinal, col.name
                ),
            );
            return "DEFAULT".to_string();
        }

        match encode_value(&self.dialect, value, col.family) {
            Ok(literal) => literal,
            Err(reason) => {
                let substitute = placeholder(col);
                self.report.warn(
                    WarningKind::Coercion,
                    Some(&self.table),
                    format!(
                        "row {} column {}: {}; substituted {}",
                        ordinal, col.name, reason, substitute
                    ),
                );
                substitute.to_string()
            }
        }
    }

    /// Blob file key: primary-key values, or the row ordinal without a key.
    ///
    /// A key with a NULL part does not identify the row, so the ordinal is
    /// appended as `~row<n>`.
    fn row_key(&self, row: &[SqlValue<'static>], ordinal: u64) -> String {
        if self.pk_indices.is_empty() {
            return ordinal.to_string();
        }
        let parts: Vec<Option<std::borrow::Cow<'_, str>>> = self
            .pk_indices
            .iter()
            .map(|&i| match row.get(i) {
                Some(SqlValue::Null) | None => None,
                Some(v) => Some(v.key_text()),
            })
            .collect();
        let key = row_key(parts.iter().map(|p| p.as_deref()));
        if parts.iter().any(Option::is_none) {
            format!("{},~row{}", key, ordinal)
        } else {
            key
        }
    }
}

/// Safe stand-in for a value that cannot be written.
fn placeholder(col: &EncodedColumn) -> &'static str {
    if col.nullable {
        "NULL"
    } else {
        "DEFAULT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::dialect::{map_schema, SqliteToMysqlMapper};
    use crate::drivers::SqliteReader;
    use crate::resolver::DependencyResolver;
    use crate::source::SchemaIntrospector;
    use rusqlite::Connection;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: Arc<dyn SourceReader>,
        schema: SchemaModel,
        mapping: SchemaMapping,
        resolved: ResolvedOrder,
        report: ReportHandle,
    }

    async fn fixture(setup: impl FnOnce(&Connection)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.db");
        {
            let conn = Connection::open(&path).unwrap();
            setup(&conn);
        }
        let source: Arc<dyn SourceReader> = Arc::new(SqliteReader::open(&path).unwrap());
        let config = MigrationConfig::default();
        let report = ReportHandle::new();
        let schema = SchemaIntrospector::new(source.clone(), config.clone())
            .introspect(&report)
            .await
            .unwrap();
        let mapper = SqliteToMysqlMapper::from_config(&config).unwrap();
        let mapping = map_schema(&mapper, &schema, &report);
        let resolved = DependencyResolver::new().resolve(&schema, &report).unwrap();
        Fixture {
            _dir: dir,
            source,
            schema,
            mapping,
            resolved,
            report,
        }
    }

    fn options(batch_size: usize, max_blob_size: usize) -> PipelineOptions {
        PipelineOptions {
            batch_size,
            max_blob_size,
            workers: 2,
            read_ahead: 2,
        }
    }

    async fn collect(
        fx: &Fixture,
        pipeline: &DataPipeline,
        cancel: &CancellationToken,
    ) -> (Vec<InsertBatch>, PipelineStats) {
        let mut out = Vec::new();
        let stats = pipeline
            .run(&fx.schema, &fx.mapping, &fx.resolved, &fx.report, cancel, |b| {
                out.push(b.clone());
                Ok(())
            })
            .await
            .unwrap();
        (out, stats)
    }

    fn fill(conn: &Connection, table: &str, n: usize) {
        for i in 1..=n {
            conn.execute(&format!("INSERT INTO {} (id) VALUES (?1)", table), [i as i64])
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_batch_boundary() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE exact (id INTEGER PRIMARY KEY); CREATE TABLE over (id INTEGER PRIMARY KEY);")
                .unwrap();
            fill(c, "exact", 3);
            fill(c, "over", 4);
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(3, 1024));
        let (out, stats) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        let exact: Vec<usize> = out.iter().filter(|b| b.table == "exact").map(|b| b.rows).collect();
        let over: Vec<usize> = out.iter().filter(|b| b.table == "over").map(|b| b.rows).collect();
        assert_eq!(exact, vec![3]);
        assert_eq!(over, vec![3, 1]);
        assert_eq!(stats.rows, 7);
        assert_eq!(stats.tables_completed, 2);
        assert!(!stats.cancelled);

        let report = fx.report.snapshot();
        assert_eq!(report.table("exact").unwrap().emitted_rows, 3);
        assert_eq!(report.table("over").unwrap().emitted_rows, 4);
    }

    #[tokio::test]
    async fn test_statements_follow_resolved_order() {
        let fx = fixture(|c| {
            c.execute_batch(
                "CREATE TABLE child (id INTEGER PRIMARY KEY, p INTEGER REFERENCES parent(id));
                 CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE other (id INTEGER PRIMARY KEY);",
            )
            .unwrap();
            fill(c, "parent", 5);
            fill(c, "child", 5);
            fill(c, "other", 5);
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(1, 1024));
        let (out, _) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        let mut seen: Vec<&str> = out.iter().map(|b| b.table.as_str()).collect();
        seen.dedup();
        let expected: Vec<&str> = fx.resolved.order.iter().map(String::as_str).collect();
        assert_eq!(seen, expected);
        assert_eq!(out.len(), 15);
    }

    #[tokio::test]
    async fn test_insert_statement_shape() {
        let fx = fixture(|c| {
            c.execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL);
                 INSERT INTO people VALUES (1, 'O''Brien', 1.5), (2, NULL, NULL);",
            )
            .unwrap();
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 1024));
        let (out, _) = collect(&fx, &pipeline, &CancellationToken::new()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].sql,
            "INSERT INTO `people` (`id`, `name`, `score`) VALUES\n(1, 'O\\'Brien', 1.5),\n(2, NULL, NULL);"
        );
    }

    #[tokio::test]
    async fn test_empty_table_emits_nothing() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE empty (id INTEGER PRIMARY KEY);").unwrap();
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 1024));
        let (out, stats) = collect(&fx, &pipeline, &CancellationToken::new()).await;
        assert!(out.is_empty());
        assert_eq!(stats.tables_completed, 1);
        assert_eq!(fx.report.snapshot().table("empty").unwrap().emitted_rows, 0);
    }

    #[tokio::test]
    async fn test_blob_threshold_and_round_trip() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB);")
                .unwrap();
            c.execute("INSERT INTO files VALUES (1, ?1)", [vec![1u8, 2, 3, 4]])
                .unwrap();
            c.execute("INSERT INTO files VALUES (2, ?1)", [vec![9u8, 8, 7, 6, 5]])
                .unwrap();
        })
        .await;
        let blob_dir = TempDir::new().unwrap();
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 4))
            .with_blob_store(Arc::new(FsBlobStore::new(blob_dir.path(), true)));
        let (out, stats) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        let sql = &out[0].sql;
        assert!(sql.contains("(1, X'01020304')"), "{}", sql);
        assert!(sql.contains("(2, LOAD_FILE('files/data/2'))"), "{}", sql);
        assert_eq!(out[0].blobs, 1);
        assert_eq!(stats.blobs, 1);

        let written = std::fs::read(blob_dir.path().join("files/data/2")).unwrap();
        assert_eq!(written, vec![9, 8, 7, 6, 5]);
        let start = sql.find("X'").unwrap() + 2;
        let end = start + sql[start..].find('\'').unwrap();
        let inline = hex::decode(&sql[start..end]).unwrap();
        assert_eq!(inline, vec![1, 2, 3, 4]);
        assert_eq!(fx.report.snapshot().table("files").unwrap().blobs_externalized, 1);
    }

    #[tokio::test]
    async fn test_blob_key_without_primary_key_uses_ordinal() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE raw (data BLOB);").unwrap();
            for _ in 0..3 {
                c.execute("INSERT INTO raw VALUES (?1)", [vec![7u8; 8]]).unwrap();
            }
        })
        .await;
        let blob_dir = TempDir::new().unwrap();
        let pipeline = DataPipeline::new(fx.source.clone(), options(2, 4))
            .with_blob_store(Arc::new(FsBlobStore::new(blob_dir.path(), true)));
        let (out, _) = collect(&fx, &pipeline, &CancellationToken::new()).await;
        assert!(out[1].sql.contains("LOAD_FILE('raw/data/3')"));
        assert!(Path::new(&blob_dir.path().join("raw/data/1")).exists());
    }

    #[tokio::test]
    async fn test_null_key_blobs_get_distinct_files() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE f (k TEXT PRIMARY KEY, data BLOB);")
                .unwrap();
            c.execute("INSERT INTO f VALUES (NULL, ?1)", [vec![1u8; 8]])
                .unwrap();
            c.execute("INSERT INTO f VALUES (NULL, ?1)", [vec![2u8; 8]])
                .unwrap();
        })
        .await;
        let blob_dir = TempDir::new().unwrap();
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 4))
            .with_blob_store(Arc::new(FsBlobStore::new(blob_dir.path(), true)));
        let (out, stats) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        let sql = &out[0].sql;
        assert!(sql.contains("(DEFAULT, LOAD_FILE('f/data/~null,~row1'))"), "{}", sql);
        assert!(sql.contains("(DEFAULT, LOAD_FILE('f/data/~null,~row2'))"), "{}", sql);
        assert_eq!(stats.blobs, 2);

        let first = std::fs::read(blob_dir.path().join("f/data/~null,~row1")).unwrap();
        let second = std::fs::read(blob_dir.path().join("f/data/~null,~row2")).unwrap();
        let mut contents = vec![first, second];
        contents.sort();
        assert_eq!(contents, vec![vec![1u8; 8], vec![2u8; 8]]);
    }

    #[tokio::test]
    async fn test_null_primary_key_is_flagged() {
        let fx = fixture(|c| {
            c.execute_batch(
                "CREATE TABLE tags (name TEXT PRIMARY KEY, note TEXT);
                 INSERT INTO tags VALUES (NULL, 'orphan'), ('red', NULL);",
            )
            .unwrap();
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 1024));
        let (out, _) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        let sql = &out[0].sql;
        assert!(sql.contains("(DEFAULT, 'orphan')"), "{}", sql);
        assert!(sql.contains("('red', NULL)"), "{}", sql);
        let report = fx.report.snapshot();
        let coercions: Vec<_> = report.warnings_of(WarningKind::Coercion).collect();
        assert_eq!(coercions.len(), 1);
        assert!(coercions[0].message.contains("column name: NULL in a NOT NULL column"));
    }

    struct FailingStore;

    impl BlobStore for FailingStore {
        fn store(
            &self,
            _table: &str,
            _column: &str,
            _key: &str,
            _bytes: &[u8],
        ) -> std::io::Result<BlobExternalization> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
    }

    #[tokio::test]
    async fn test_blob_write_failure_is_row_scoped() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB);")
                .unwrap();
            c.execute("INSERT INTO files VALUES (1, ?1)", [vec![0u8; 16]])
                .unwrap();
            c.execute("INSERT INTO files VALUES (2, ?1)", [vec![1u8]]).unwrap();
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 4))
            .with_blob_store(Arc::new(FailingStore));
        let (out, stats) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        assert!(out[0].sql.contains("(1, NULL)"));
        assert!(out[0].sql.contains("(2, X'01')"));
        assert_eq!(stats.rows, 2);
        let report = fx.report.snapshot();
        let failures: Vec<_> = report.warnings_of(WarningKind::BlobWrite).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("disk full"));
        assert_eq!(report.table("files").unwrap().emitted_rows, 2);
    }

    #[tokio::test]
    async fn test_coercion_failure_substitutes() {
        let fx = fixture(|c| {
            c.execute_batch(
                "CREATE TABLE m (id INTEGER PRIMARY KEY, req INTEGER NOT NULL, opt INTEGER);
                 INSERT INTO m VALUES (1, 'abc', 'xyz'), (2, 5, 6);",
            )
            .unwrap();
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(10, 1024));
        let (out, _) = collect(&fx, &pipeline, &CancellationToken::new()).await;

        assert!(out[0].sql.contains("(1, DEFAULT, NULL)"), "{}", out[0].sql);
        assert!(out[0].sql.contains("(2, 5, 6)"));
        let report = fx.report.snapshot();
        let coercions: Vec<_> = report.warnings_of(WarningKind::Coercion).collect();
        assert_eq!(coercions.len(), 2);
        assert!(coercions[0].message.starts_with("row 1 column req"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
            fill(c, "t", 4);
        })
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = DataPipeline::new(fx.source.clone(), options(2, 1024));
        let (out, stats) = collect(&fx, &pipeline, &cancel).await;

        assert!(out.is_empty());
        assert!(stats.cancelled);
        assert_eq!(stats.tables_completed, 0);
        assert!(fx.report.snapshot().cancelled);
    }

    #[tokio::test]
    async fn test_cancel_mid_table_keeps_exact_counts() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
            fill(c, "t", 10);
        })
        .await;
        let cancel = CancellationToken::new();
        let pipeline = DataPipeline::new(fx.source.clone(), options(2, 1024));
        let mut emitted = 0;
        let stats = pipeline
            .run(&fx.schema, &fx.mapping, &fx.resolved, &fx.report, &cancel, |b| {
                emitted += b.rows;
                cancel.cancel();
                Ok(())
            })
            .await
            .unwrap();

        assert!(stats.cancelled);
        assert!(emitted < 10);
        assert_eq!(stats.rows, emitted as i64);
        assert_eq!(fx.report.snapshot().table("t").unwrap().emitted_rows, emitted as i64);
    }

    #[tokio::test]
    async fn test_emit_error_aborts() {
        let fx = fixture(|c| {
            c.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
            fill(c, "t", 3);
        })
        .await;
        let pipeline = DataPipeline::new(fx.source.clone(), options(1, 1024));
        let result = pipeline
            .run(
                &fx.schema,
                &fx.mapping,
                &fx.resolved,
                &fx.report,
                &CancellationToken::new(),
                |_| Err(MigrateError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))),
            )
            .await;
        assert!(matches!(result, Err(MigrateError::Io(_))));
    }

    #[test]
    fn test_level_runs() {
        let order: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let levels: HashMap<&str, usize> = [("a", 0), ("b", 0), ("c", 1), ("d", 0)].into_iter().collect();
        let runs = level_runs(&order, &levels);
        assert_eq!(runs, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
    }
}
