//! Migration report: per-table row counts, warnings, and errors.
//!
//! A single [`ReportHandle`] is created per run and passed explicitly to every
//! component. Table workers append through it concurrently; each append holds
//! the lock only for the push itself.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::identifier::comment_safe;

/// Category of a report warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Foreign key deferred to break a dependency cycle.
    CycleBreak,
    /// Declared type fell back to the widest safe type.
    TypeFallback,
    /// Heuristic mapping, e.g. boolean inference.
    LowConfidence,
    /// Default expression passed through or dropped.
    DefaultValue,
    /// Trigger statement commented out, or trigger needs manual review.
    UnsupportedTrigger,
    /// Source object skipped (virtual table, expression index, ...).
    SkippedObject,
    /// DDL clause adjusted or omitted for the target.
    Ddl,
    /// Value that could not be coerced to its target type.
    Coercion,
    /// Blob file could not be written.
    BlobWrite,
    /// Emitted row count differs from the source count.
    RowCountMismatch,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::CycleBreak => "foreign key cycles",
            WarningKind::TypeFallback => "type fallbacks",
            WarningKind::LowConfidence => "low-confidence mappings",
            WarningKind::DefaultValue => "default values",
            WarningKind::UnsupportedTrigger => "unsupported trigger logic",
            WarningKind::SkippedObject => "skipped objects",
            WarningKind::Ddl => "DDL adjustments",
            WarningKind::Coercion => "value coercions",
            WarningKind::BlobWrite => "blob externalization failures",
            WarningKind::RowCountMismatch => "row count mismatches",
        }
    }
}

/// A recorded warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub message: String,
}

/// Verification outcome for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Verification not requested.
    NotVerified,
    Matched,
    Mismatch,
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::NotVerified => "not verified",
            VerifyStatus::Matched => "OK",
            VerifyStatus::Mismatch => "MISMATCH",
        }
    }
}

/// Row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    /// Rows reported by the source count query.
    pub source_rows: i64,
    /// Rows written into INSERT statements.
    pub emitted_rows: i64,
    /// Blob values written to external files.
    pub blobs_externalized: i64,
    pub status: VerifyStatus,
}

/// Accumulated outcome of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Per-table counts in resolved order.
    pub tables: Vec<TableCount>,
    pub warnings: Vec<Warning>,
    /// Fatal errors (at most one per run in practice).
    pub errors: Vec<String>,
    /// Whether the row-count comparison ran.
    pub verified: bool,
    /// Whether the run stopped on a cancellation signal.
    pub cancelled: bool,
}

impl MigrationReport {
    /// Find the counts entry for a table.
    pub fn table(&self, name: &str) -> Option<&TableCount> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    pub fn total_emitted(&self) -> i64 {
        self.tables.iter().map(|t| t.emitted_rows).sum()
    }

    pub fn total_blobs(&self) -> i64 {
        self.tables.iter().map(|t| t.blobs_externalized).sum()
    }

    pub fn has_mismatches(&self) -> bool {
        self.tables
            .iter()
            .any(|t| t.status == VerifyStatus::Mismatch)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as a block of `-- ` comment lines for the end of the script.
    pub fn render_comment_block(&self) -> String {
        let mut out = String::new();
        out.push_str("-- ------------------------------------------------------------\n");
        out.push_str("-- Migration report\n");
        out.push_str("-- ------------------------------------------------------------\n");
        if self.cancelled {
            out.push_str("-- Run was CANCELLED; counts reflect rows emitted before the stop.\n");
        }

        if !self.tables.is_empty() {
            let width = self
                .tables
                .iter()
                .map(|t| comment_safe(&t.table).chars().count())
                .max()
                .unwrap_or(0)
                .max(5);
            let _ = writeln!(
                out,
                "-- {:<width$}  {:>12}  {:>12}  {}",
                "table",
                "source",
                "emitted",
                "status",
                width = width
            );
            for t in &self.tables {
                let _ = write!(
                    out,
                    "-- {:<width$}  {:>12}  {:>12}  {}",
                    comment_safe(&t.table),
                    t.source_rows,
                    t.emitted_rows,
                    t.status.as_str(),
                    width = width
                );
                if t.blobs_externalized > 0 {
                    let _ = write!(out, " ({} blobs externalized)", t.blobs_externalized);
                }
                out.push('\n');
            }
        }

        let mut kinds: Vec<WarningKind> = self.warnings.iter().map(|w| w.kind).collect();
        kinds.sort();
        kinds.dedup();
        for kind in kinds {
            let items: Vec<&Warning> = self.warnings_of(kind).collect();
            let _ = writeln!(out, "--\n-- Warnings: {} ({})", kind.label(), items.len());
            for w in items {
                let text = match w.table {
                    Some(ref table) => format!("[{}] {}", comment_safe(table), w.message),
                    None => w.message.clone(),
                };
                for line in text.lines() {
                    let _ = writeln!(out, "--   {}", line);
                }
            }
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "--\n-- Errors ({})", self.errors.len());
            for e in &self.errors {
                for line in e.lines() {
                    let _ = writeln!(out, "--   {}", line);
                }
            }
        }
        out
    }
}

/// Shared, serialized accumulator for a [`MigrationReport`].
#[derive(Debug, Clone, Default)]
pub struct ReportHandle {
    inner: Arc<Mutex<MigrationReport>>,
}

impl ReportHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it.
    pub fn warn(&self, kind: WarningKind, table: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        match table {
            Some(t) => warn!("[{}] {}", t, message),
            None => warn!("{}", message),
        }
        self.inner.lock().warnings.push(Warning {
            kind,
            table: table.map(str::to_string),
            message,
        });
    }

    /// Record a fatal error and log it.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.inner.lock().errors.push(message);
    }

    /// Register a table for row accounting, in resolved order.
    pub fn register_table(&self, table: &str, source_rows: i64) {
        let mut report = self.inner.lock();
        if report.tables.iter().all(|t| t.table != table) {
            report.tables.push(TableCount {
                table: table.to_string(),
                source_rows,
                emitted_rows: 0,
                blobs_externalized: 0,
                status: VerifyStatus::NotVerified,
            });
        }
    }

    /// Add emitted rows and externalized blobs for a table.
    pub fn add_emitted(&self, table: &str, rows: i64, blobs: i64) {
        let mut report = self.inner.lock();
        if let Some(entry) = report.tables.iter_mut().find(|t| t.table == table) {
            entry.emitted_rows += rows;
            entry.blobs_externalized += blobs;
        }
    }

    pub fn set_cancelled(&self) {
        self.inner.lock().cancelled = true;
    }

    /// Apply a mutation under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut MigrationReport) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> MigrationReport {
        self.inner.lock().clone()
    }
}
