//! Trigger translation.
//!
//! Trigger bodies are rewritten statement by statement through a table of
//! recognized shapes ([`rules`]); anything unrecognized becomes an inert,
//! commented-out fragment and the trigger is flagged for review. Translation
//! never fails the run.

pub(crate) mod lexer;
mod parse;
mod rules;

pub use parse::{parse_trigger, split_statements};

use serde::Serialize;
use tracing::debug;

use crate::core::identifier::{comment_safe, mysql_name, quote_mysql};
use crate::core::schema::{SchemaModel, Trigger, TriggerEvent, TriggerTiming};
use crate::report::{ReportHandle, WarningKind};

use lexer::tokenize;
use rules::{rewrite_expression, rewrite_self_update, rewrite_statement, RowContext};

/// Per-statement translation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    /// Rewritten to MySQL syntax.
    Translated,
    /// Valid in both dialects, emitted unchanged.
    Passthrough,
    /// No MySQL equivalent, emitted commented out.
    Unsupported,
}

/// One body statement after translation.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatedStatement {
    pub source: String,
    /// MySQL text; empty when unsupported.
    pub sql: String,
    pub status: TranslationStatus,
    /// Why the statement is unsupported.
    pub note: Option<String>,
}

/// A trigger rendered for MySQL.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatedTrigger {
    pub name: String,
    pub table: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    /// Translated WHEN condition.
    pub when: Option<String>,
    pub statements: Vec<TranslatedStatement>,
    /// Some statements were left commented out.
    pub needs_review: bool,
    /// The whole trigger is emitted as a comment, with the reason.
    pub commented_out: Option<String>,
    /// Original CREATE TRIGGER text.
    pub source_sql: String,
}

impl TranslatedTrigger {
    /// Render for a `DELIMITER ;;` block.
    pub fn render(&self, drop_existing: bool) -> String {
        let name = quote_mysql(&mysql_name(&self.name));
        let mut out = String::new();

        if let Some(reason) = &self.commented_out {
            out.push_str(&format!(
                "-- Trigger {} needs manual review: {}\n",
                comment_safe(&name),
                comment_safe(&normalize(reason))
            ));
            for line in self.source_sql.lines() {
                out.push_str(&format!("-- {}\n", comment_safe(line.trim_end())));
            }
            return out;
        }

        if drop_existing {
            out.push_str(&format!("DROP TRIGGER IF EXISTS {};;\n", name));
        }
        if self.needs_review {
            out.push_str(&format!(
                "-- Trigger {} contains untranslated statements, review before use\n",
                comment_safe(&name)
            ));
        }
        out.push_str(&format!(
            "CREATE TRIGGER {} {} {} ON {}\nFOR EACH ROW\nBEGIN\n",
            name,
            self.timing.as_sql(),
            self.event.as_sql(),
            quote_mysql(&mysql_name(&self.table))
        ));

        let indent = match &self.when {
            Some(cond) => {
                out.push_str(&format!("    IF {} THEN\n", cond));
                "        "
            }
            None => "    ",
        };
        for stmt in &self.statements {
            match stmt.status {
                TranslationStatus::Unsupported => {
                    let note = normalize(stmt.note.as_deref().unwrap_or("no MySQL equivalent"));
                    out.push_str(&format!(
                        "{}-- unsupported: {}\n",
                        indent,
                        comment_safe(&note)
                    ));
                    for line in stmt.source.lines() {
                        out.push_str(&format!("{}-- {}\n", indent, comment_safe(line.trim_end())));
                    }
                }
                _ => {
                    let mut lines = stmt.sql.lines().peekable();
                    while let Some(line) = lines.next() {
                        let end = if lines.peek().is_none() { ";" } else { "" };
                        out.push_str(&format!("{}{}{}\n", indent, line.trim_end(), end));
                    }
                }
            }
        }
        if self.when.is_some() {
            out.push_str("    END IF;\n");
        }
        out.push_str("END;;\n");
        out
    }
}

/// Rewrites SQLite triggers into MySQL triggers.
#[derive(Debug, Clone, Default)]
pub struct TriggerTranslator;

impl TriggerTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate every trigger of the schema in catalog order.
    pub fn translate_all(&self, schema: &SchemaModel, report: &ReportHandle) -> Vec<TranslatedTrigger> {
        schema
            .triggers
            .iter()
            .map(|t| self.translate(t, schema, report))
            .collect()
    }

    /// Translate one trigger, recording warnings for everything left behind.
    pub fn translate(
        &self,
        trigger: &Trigger,
        schema: &SchemaModel,
        report: &ReportHandle,
    ) -> TranslatedTrigger {
        let mut out = TranslatedTrigger {
            name: trigger.name.clone(),
            table: trigger.table.clone(),
            timing: trigger.timing,
            event: trigger.event,
            when: None,
            statements: Vec::new(),
            needs_review: false,
            commented_out: None,
            source_sql: trigger.sql.clone(),
        };
        let warn = |msg: String| {
            report.warn(
                WarningKind::UnsupportedTrigger,
                Some(&trigger.table),
                format!("trigger {}: {}", trigger.name, msg),
            )
        };

        let table = match (trigger.timing, schema.table(&trigger.table)) {
            (TriggerTiming::InsteadOf, _) => {
                return comment_out(out, "INSTEAD OF triggers have no MySQL equivalent", warn);
            }
            (_, None) => {
                return comment_out(out, "MySQL triggers must be defined on a base table", warn);
            }
            (_, Some(table)) => table,
        };

        let columns = table.column_names();
        let mut key = table.primary_key.clone();
        if key.is_empty() {
            key.extend(table.columns.iter().filter(|c| c.is_rowid_alias).map(|c| c.name.clone()));
        }
        let ctx = RowContext {
            table: &table.name,
            columns: &columns,
            key: &key,
        };

        if !trigger.update_of.is_empty() {
            warn(format!(
                "UPDATE OF {} fires on every update in MySQL",
                trigger.update_of.join(", ")
            ));
        }

        if let Some(cond) = &trigger.when {
            let toks = tokenize(cond);
            match rewrite_expression(cond, &toks, None) {
                Ok(rewritten) => out.when = Some(rewritten),
                Err(reason) => {
                    return comment_out(out, &format!("WHEN clause: {}", reason), warn);
                }
            }
        }

        // AFTER UPDATE triggers that only touch their own row become BEFORE
        // UPDATE triggers assigning NEW directly
        if trigger.timing == TriggerTiming::After && trigger.event == TriggerEvent::Update {
            let rewritten: Option<Vec<String>> = trigger
                .body
                .iter()
                .map(|stmt| rewrite_self_update(&ctx, stmt))
                .collect();
            if let Some(sets) = rewritten.filter(|s| !s.is_empty()) {
                debug!("trigger {}: self-update rewritten to BEFORE UPDATE", trigger.name);
                out.timing = TriggerTiming::Before;
                out.statements = trigger
                    .body
                    .iter()
                    .zip(sets)
                    .map(|(source, sql)| TranslatedStatement {
                        source: source.clone(),
                        sql,
                        status: TranslationStatus::Translated,
                        note: None,
                    })
                    .collect();
                return out;
            }
        }

        for source in &trigger.body {
            let stmt = match rewrite_statement(&ctx, source) {
                Ok(sql) => {
                    let status = if normalize(&sql) == normalize(source) {
                        TranslationStatus::Passthrough
                    } else {
                        TranslationStatus::Translated
                    };
                    TranslatedStatement {
                        source: source.clone(),
                        sql,
                        status,
                        note: None,
                    }
                }
                Err(reason) => {
                    warn(format!("{} in `{}`", reason, first_line(source)));
                    out.needs_review = true;
                    TranslatedStatement {
                        source: source.clone(),
                        sql: String::new(),
                        status: TranslationStatus::Unsupported,
                        note: Some(reason),
                    }
                }
            };
            out.statements.push(stmt);
        }

        let executable = out
            .statements
            .iter()
            .any(|s| s.status != TranslationStatus::Unsupported);
        if !executable {
            return comment_out(out, "no statement could be translated", |_| {});
        }
        out
    }
}

fn comment_out(
    mut trigger: TranslatedTrigger,
    reason: &str,
    warn: impl Fn(String),
) -> TranslatedTrigger {
    warn(format!("emitted commented out: {}", reason));
    trigger.needs_review = true;
    trigger.commented_out = Some(reason.to_string());
    trigger
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or(sql).trim()
}
