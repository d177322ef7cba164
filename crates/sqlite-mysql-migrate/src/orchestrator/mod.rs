//! Migration orchestrator - main workflow coordinator.
//!
//! A run introspects the source, maps types, resolves the table order,
//! translates triggers, and then writes the script section by section while
//! the data pipeline streams rows. The report block is written even when the
//! run fails, so a broken script still explains itself.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::schema::{ForeignKey, SchemaModel};
use crate::core::traits::{ColumnMapping, SourceReader};
use crate::dialect::{map_schema, SchemaMapping, SqliteToMysqlMapper};
use crate::emitter::{DdlGenerator, ScriptEmitter, ScriptHeader, ScriptSink};
use crate::error::Result;
use crate::report::{MigrationReport, ReportHandle, Warning};
use crate::resolver::{DependencyResolver, ResolvedOrder};
use crate::source::SchemaIntrospector;
use crate::transfer::{DataPipeline, PipelineStats};
use crate::trigger::{TranslatedTrigger, TriggerTranslator};
use crate::verify::IntegrityVerifier;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the resolved order.
    pub tables_total: usize,

    /// Rows written into INSERT statements.
    pub rows_emitted: i64,

    /// Blob values written to external files.
    pub blobs_externalized: i64,

    /// Whether the run stopped on a cancellation signal.
    pub cancelled: bool,

    /// Final report.
    pub report: MigrationReport,
}

impl MigrationResult {
    /// Convert result to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One table of a dry-run plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTable {
    pub name: String,
    pub level: usize,
    pub rows: i64,
    pub columns: Vec<ColumnMapping>,
}

/// One trigger of a dry-run plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTrigger {
    pub name: String,
    pub table: String,
    pub needs_review: bool,
    pub commented_out: Option<String>,
}

/// Dry-run outcome: what a run would produce, without any data.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub target_version: String,
    /// Tables in creation order.
    pub tables: Vec<PlannedTable>,
    pub levels: Vec<Vec<String>>,
    pub deferred: Vec<ForeignKey>,
    pub views: Vec<String>,
    pub triggers: Vec<PlannedTrigger>,
    pub warnings: Vec<Warning>,
}

impl MigrationPlan {
    /// Convert plan to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable rendering for the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Target: MySQL {}", self.target_version);
        let _ = writeln!(out, "\nTable order ({}):", self.tables.len());
        for (i, t) in self.tables.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {:>3}. {} (level {}, {} rows)",
                i + 1,
                t.name,
                t.level,
                t.rows
            );
        }

        if !self.deferred.is_empty() {
            let _ = writeln!(out, "\nDeferred foreign keys:");
            for fk in &self.deferred {
                let _ = writeln!(out, "  {}", fk.describe());
            }
        }

        let _ = writeln!(out, "\nColumns:");
        for t in &self.tables {
            let _ = writeln!(out, "  {}", t.name);
            for c in &t.columns {
                let mut line = format!("    {} {} -> {}", c.name, c.source_type, c.target_type);
                if !c.is_nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(ref default) = c.default {
                    let _ = write!(line, " DEFAULT {}", default);
                }
                if c.auto_increment {
                    line.push_str(" AUTO_INCREMENT");
                }
                let _ = writeln!(out, "{}", line.trim_end());
            }
        }

        if !self.views.is_empty() {
            let _ = writeln!(out, "\nViews: {}", self.views.join(", "));
        }
        if !self.triggers.is_empty() {
            let _ = writeln!(out, "\nTriggers:");
            for t in &self.triggers {
                let status = match (&t.commented_out, t.needs_review) {
                    (Some(reason), _) => format!("commented out: {}", reason),
                    (None, true) => "needs review".to_string(),
                    (None, false) => "translated".to_string(),
                };
                let _ = writeln!(out, "  {} on {} ({})", t.name, t.table, status);
            }
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "\nWarnings ({}):", self.warnings.len());
            for w in &self.warnings {
                match w.table {
                    Some(ref table) => {
                        let _ = writeln!(out, "  [{}] [{}] {}", w.kind.label(), table, w.message);
                    }
                    None => {
                        let _ = writeln!(out, "  [{}] {}", w.kind.label(), w.message);
                    }
                }
            }
        }
        out
    }
}

/// Everything derived from the source before output starts.
struct Prepared {
    schema: SchemaModel,
    mapping: SchemaMapping,
    resolved: ResolvedOrder,
    triggers: Vec<TranslatedTrigger>,
}

impl Orchestrator {
    /// Create a new orchestrator over an open source.
    pub fn new(config: Config, source: Arc<dyn SourceReader>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn prepare(&self, report: &ReportHandle, with_triggers: bool) -> Result<Prepared> {
        self.config.validate()?;
        let migration = &self.config.migration;

        info!("Phase 1: Introspecting {}", self.config.source.path.display());
        let schema = SchemaIntrospector::new(self.source.clone(), migration.clone())
            .introspect(report)
            .await?;
        info!(
            "Found {} tables, {} views, {} triggers",
            schema.tables.len(),
            schema.views.len(),
            schema.triggers.len()
        );

        info!("Phase 2: Mapping column types");
        let mapper = SqliteToMysqlMapper::from_config(migration)?;
        let mapping = map_schema(&mapper, &schema, report);

        info!("Phase 3: Resolving table order");
        let resolved = DependencyResolver::new().resolve(&schema, report)?;

        let triggers = if with_triggers {
            TriggerTranslator::new().translate_all(&schema, report)
        } else {
            Vec::new()
        };

        Ok(Prepared {
            schema,
            mapping,
            resolved,
            triggers,
        })
    }

    /// Dry run: introspect, map, and resolve without reading any data.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let report = ReportHandle::new();
        let prepared = self.prepare(&report, true).await?;
        let levels = level_index(&prepared.resolved);

        let tables = prepared
            .resolved
            .order
            .iter()
            .filter_map(|name| {
                let table = prepared.schema.table(name)?;
                let mapping = prepared.mapping.table(name)?;
                Some(PlannedTable {
                    name: name.clone(),
                    level: levels.get(name.as_str()).copied().unwrap_or(0),
                    rows: table.row_count,
                    columns: mapping.columns.clone(),
                })
            })
            .collect();

        Ok(MigrationPlan {
            target_version: self.config.migration.target_version.clone(),
            tables,
            levels: prepared.resolved.levels.clone(),
            deferred: prepared.resolved.deferred.clone(),
            views: prepared.schema.views.iter().map(|v| v.name.clone()).collect(),
            triggers: prepared
                .triggers
                .iter()
                .map(|t| PlannedTrigger {
                    name: t.name.clone(),
                    table: t.table.clone(),
                    needs_review: t.needs_review,
                    commented_out: t.commented_out.clone(),
                })
                .collect(),
            warnings: report.snapshot().warnings,
        })
    }

    /// Run the migration, writing the script to `sink`.
    ///
    /// # Errors
    ///
    /// Fatal errors (invalid configuration, unreadable source, malformed
    /// schema, sink failures) are returned after the report, including the
    /// error, has been written. Cancellation is not an error: the result has
    /// `cancelled` set and the report holds the partial counts.
    pub async fn run(
        &self,
        sink: &mut dyn ScriptSink,
        cancel: CancellationToken,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let report = ReportHandle::new();
        info!("Starting migration run: {}", run_id);

        let mut emitter = ScriptEmitter::new(sink);
        let outcome = self.execute(&mut emitter, &report, &cancel, started_at).await;
        if let Err(ref e) = outcome {
            report.error(e.to_string());
        }

        let snapshot = report.snapshot();
        let written = emitter.report(&snapshot).and_then(|()| emitter.flush());
        let (tables_total, stats) = match (outcome, written) {
            (Err(e), written) => {
                if let Err(secondary) = written {
                    warn!("Could not write the report block: {}", secondary);
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
            (Ok(done), Ok(())) => done,
        };

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let result = MigrationResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds,
            tables_total,
            rows_emitted: snapshot.total_emitted(),
            blobs_externalized: snapshot.total_blobs(),
            cancelled: stats.cancelled || snapshot.cancelled,
            report: snapshot,
        };

        info!(
            "Migration {}: {} tables, {} rows, {} blobs in {:.1}s",
            if result.cancelled { "cancelled" } else { "completed" },
            result.tables_total,
            result.rows_emitted,
            result.blobs_externalized,
            result.duration_seconds
        );
        Ok(result)
    }

    async fn execute(
        &self,
        emitter: &mut ScriptEmitter<'_>,
        report: &ReportHandle,
        cancel: &CancellationToken,
        started_at: DateTime<Utc>,
    ) -> Result<(usize, PipelineStats)> {
        let migration = &self.config.migration;
        let mode = migration.export_mode;

        emitter.header(&ScriptHeader {
            source: self.config.source.path.clone(),
            generated_at: started_at,
            config_hash: self.config.hash(),
            target_version: migration.target_version.clone(),
        })?;

        let prepared = self.prepare(report, mode.includes_structure()).await?;
        let Prepared {
            schema,
            mapping,
            resolved,
            triggers,
        } = prepared;
        for name in &resolved.order {
            if let Some(table) = schema.table(name) {
                report.register_table(&table.name, table.row_count);
            }
        }

        let version = migration.mysql_version()?;
        let ddl = DdlGenerator::new(migration, version, report);
        emitter.preamble(&migration.charset)?;

        if mode.includes_structure() {
            if migration.drop_tables {
                emitter.section("Drop existing objects")?;
                for view in schema.views.iter().rev() {
                    emitter.statement(&ddl.drop_view(&view.name))?;
                }
                for name in resolved.order.iter().rev() {
                    emitter.statement(&ddl.drop_table(name))?;
                }
            }

            emitter.section("Tables")?;
            for name in &resolved.order {
                let (Some(table), Some(table_mapping)) = (schema.table(name), mapping.table(name))
                else {
                    continue;
                };
                emitter.statement(&ddl.create_table(table, table_mapping, &resolved))?;
            }

            let indexes: Vec<String> = resolved
                .order
                .iter()
                .filter_map(|name| Some((schema.table(name)?, mapping.table(name)?)))
                .flat_map(|(table, table_mapping)| ddl.create_indexes(table, table_mapping))
                .collect();
            if !indexes.is_empty() {
                emitter.section("Indexes")?;
                for sql in &indexes {
                    emitter.statement(sql)?;
                }
            }
        }

        let mut stats = PipelineStats::default();
        if mode.includes_data() {
            info!("Phase 4: Streaming data");
            emitter.section("Data")?;
            emitter.begin_transaction()?;
            let pipeline = DataPipeline::from_config(self.source.clone(), migration)?;
            stats = pipeline
                .run(&schema, &mapping, &resolved, report, cancel, |insert| {
                    emitter.statement(&insert.sql)
                })
                .await?;
            emitter.commit()?;
        }

        if stats.cancelled || cancel.is_cancelled() {
            stats.cancelled = true;
            report.set_cancelled();
            emitter.comment("Run cancelled; remaining statements were not generated.")?;
            emitter.postamble()?;
            IntegrityVerifier::new(migration.verify_data).verify(report);
            return Ok((resolved.order.len(), stats));
        }

        if mode.includes_structure() {
            if !schema.views.is_empty() {
                emitter.section("Views")?;
                for view in &schema.views {
                    emitter.statement(&ddl.create_view(view))?;
                }
            }
            if !triggers.is_empty() {
                emitter.section("Triggers")?;
                emitter.triggers(&triggers, migration.drop_tables)?;
            }
            if !resolved.deferred.is_empty() {
                emitter.section("Deferred foreign keys")?;
                for fk in &resolved.deferred {
                    emitter.statement(&ddl.add_foreign_key(fk))?;
                }
            }
        }

        emitter.postamble()?;

        info!("Phase 5: Verifying row counts");
        IntegrityVerifier::new(migration.verify_data).verify(report);
        Ok((resolved.order.len(), stats))
    }
}

fn level_index(resolved: &ResolvedOrder) -> HashMap<&str, usize> {
    resolved
        .levels
        .iter()
        .enumerate()
        .flat_map(|(level, tables)| tables.iter().map(move |t| (t.as_str(), level)))
        .collect()
}
