//! Row-count verification.
//!
//! Compares, per table, the count taken by the introspector against the
//! number of rows the pipeline wrote into INSERT statements. A mismatch is a
//! warning, never an error: structure-only exports and cancelled runs
//! legitimately emit fewer rows than the source holds.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::report::{ReportHandle, VerifyStatus, WarningKind};

/// Verification result for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableVerifyResult {
    pub table: String,
    pub source_rows: i64,
    pub emitted_rows: i64,
    pub status: VerifyStatus,
}

/// Verification result for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResult {
    pub tables: Vec<TableVerifyResult>,
}

impl VerifyResult {
    pub fn matched(&self) -> usize {
        self.count(VerifyStatus::Matched)
    }

    pub fn mismatched(&self) -> usize {
        self.count(VerifyStatus::Mismatch)
    }

    fn count(&self, status: VerifyStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }
}

/// Finalizes the row-count section of the report.
#[derive(Debug, Clone, Default)]
pub struct IntegrityVerifier {
    enabled: bool,
}

impl IntegrityVerifier {
    /// A disabled verifier leaves every table `NotVerified`.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Compare source and emitted counts for every registered table.
    pub fn verify(&self, report: &ReportHandle) -> VerifyResult {
        if !self.enabled {
            return VerifyResult::default();
        }

        let (result, cancelled) = report.update(|r| {
            r.verified = true;
            let mut result = VerifyResult::default();
            for entry in &mut r.tables {
                entry.status = if entry.source_rows == entry.emitted_rows {
                    VerifyStatus::Matched
                } else {
                    VerifyStatus::Mismatch
                };
                result.tables.push(TableVerifyResult {
                    table: entry.table.clone(),
                    source_rows: entry.source_rows,
                    emitted_rows: entry.emitted_rows,
                    status: entry.status,
                });
            }
            (result, r.cancelled)
        });

        // Warnings go through the handle so they are logged; not under the lock
        for t in result.tables.iter().filter(|t| t.status == VerifyStatus::Mismatch) {
            let mut message = format!(
                "source has {} rows, script contains {}",
                t.source_rows, t.emitted_rows
            );
            if cancelled {
                message.push_str(" (run cancelled)");
            }
            report.warn(WarningKind::RowCountMismatch, Some(&t.table), message);
        }

        info!(
            "Verification: {} tables matched, {} mismatched",
            result.matched(),
            result.mismatched()
        );
        result
    }
}
