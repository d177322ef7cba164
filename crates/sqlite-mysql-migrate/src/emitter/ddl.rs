//! MySQL DDL generation: tables, indexes, views, and foreign keys.

use tracing::debug;

use crate::config::MigrationConfig;
use crate::core::identifier::{derived_name, quote_mysql};
use crate::core::schema::{ForeignKey, Index, IndexKind, ReferentialAction, Table, View};
use crate::core::traits::{ColumnMapping, TypeFamily};
use crate::dialect::TableMapping;
use crate::drivers::mysql::MysqlVersion;
use crate::report::{ReportHandle, WarningKind};
use crate::resolver::ResolvedOrder;
use crate::trigger::lexer::{backtick_identifiers, tokenize, TokenKind};

/// Key prefix length for TEXT and BLOB columns.
pub const INDEX_PREFIX_LENGTH: u32 = 255;

/// Builds DDL statements for one run.
pub struct DdlGenerator<'a> {
    config: &'a MigrationConfig,
    version: MysqlVersion,
    report: &'a ReportHandle,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(config: &'a MigrationConfig, version: MysqlVersion, report: &'a ReportHandle) -> Self {
        Self {
            config,
            version,
            report,
        }
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_mysql(table))
    }

    pub fn drop_view(&self, view: &str) -> String {
        format!("DROP VIEW IF EXISTS {};", quote_mysql(view))
    }

    /// `CREATE TABLE` with columns, primary key, and non-deferred foreign keys.
    pub fn create_table(
        &self,
        table: &Table,
        mapping: &TableMapping,
        resolved: &ResolvedOrder,
    ) -> String {
        let mut lines: Vec<String> = Vec::new();
        for col in &table.columns {
            match mapping.column(&col.name) {
                Some(m) => lines.push(column_definition(m)),
                None => debug!("{}: column {} has no mapping", table.name, col.name),
            }
        }

        if !table.primary_key.is_empty() {
            let cols = self.key_columns(table, mapping, &table.primary_key, "primary key");
            if !cols.is_empty() {
                lines.push(format!("PRIMARY KEY ({})", cols.join(", ")));
            }
        }

        for fk in &table.foreign_keys {
            if !resolved.is_deferred(fk) {
                lines.push(self.foreign_key_clause(fk));
            }
        }

        let options = &table.options;
        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n) ENGINE={} DEFAULT CHARSET={} COLLATE={}",
            quote_mysql(&table.name),
            lines.join(",\n  "),
            options.engine,
            options.charset,
            options.collation
        );
        if let Some(ref tablespace) = options.tablespace {
            sql.push_str(&format!(" TABLESPACE {}", tablespace));
        }
        if let Some(ref partition) = options.partition {
            sql.push('\n');
            sql.push_str(partition);
        }
        sql.push(';');
        sql
    }

    /// Secondary index statements, then the FULLTEXT index if one applies.
    pub fn create_indexes(&self, table: &Table, mapping: &TableMapping) -> Vec<String> {
        let mut statements: Vec<String> = table
            .indexes
            .iter()
            .filter_map(|index| self.create_index(table, mapping, index))
            .collect();
        statements.extend(self.fulltext_index(table, mapping));
        statements
    }

    fn create_index(&self, table: &Table, mapping: &TableMapping, index: &Index) -> Option<String> {
        let label = format!("index {}", index.name);
        let cols = self.key_columns(table, mapping, &index.columns, &label);
        if cols.is_empty() {
            self.report.warn(
                WarningKind::Ddl,
                Some(&table.name),
                format!("index {} skipped: no indexable columns", index.name),
            );
            return None;
        }
        let kind = match index.kind {
            IndexKind::Regular => "",
            IndexKind::Unique => "UNIQUE ",
            IndexKind::Fulltext => "FULLTEXT ",
        };
        Some(format!(
            "CREATE {}INDEX {} ON {} ({});",
            kind,
            quote_mysql(&index.name),
            quote_mysql(&table.name),
            cols.join(", ")
        ))
    }

    /// Quote key columns, adding prefixes for TEXT/BLOB and dropping JSON.
    fn key_columns(
        &self,
        table: &Table,
        mapping: &TableMapping,
        columns: &[String],
        label: &str,
    ) -> Vec<String> {
        let mut out = Vec::with_capacity(columns.len());
        for name in columns {
            let quoted = quote_mysql(name);
            match mapping.column(name) {
                Some(m) if m.family == TypeFamily::Json => {
                    self.report.warn(
                        WarningKind::Ddl,
                        Some(&table.name),
                        format!("JSON column {} cannot be indexed; removed from {}", name, label),
                    );
                }
                Some(m) if needs_prefix(m) => {
                    out.push(format!("{}({})", quoted, INDEX_PREFIX_LENGTH));
                }
                _ => out.push(quoted),
            }
        }
        out
    }

    fn fulltext_index(&self, table: &Table, mapping: &TableMapping) -> Option<String> {
        if !self.config.fulltext {
            if table.full_text {
                self.report.warn(
                    WarningKind::Ddl,
                    Some(&table.name),
                    "full-text table migrated as a plain table; enable fulltext to index it",
                );
            }
            return None;
        }

        let text_columns: Vec<&ColumnMapping> = table
            .columns
            .iter()
            .filter_map(|c| mapping.column(&c.name))
            .filter(|m| m.family.is_fulltext_eligible())
            .collect();
        if text_columns.is_empty() {
            return None;
        }

        let engine = table.options.engine.as_str();
        if engine.eq_ignore_ascii_case("MEMORY") {
            self.report.warn(
                WarningKind::Ddl,
                Some(&table.name),
                "FULLTEXT index skipped: the MEMORY engine does not support it",
            );
            return None;
        }
        if engine.eq_ignore_ascii_case("InnoDB") && !self.version.supports_innodb_fulltext() {
            self.report.warn(
                WarningKind::Ddl,
                Some(&table.name),
                format!(
                    "FULLTEXT index skipped: InnoDB supports it from MySQL 5.6, target is {}",
                    self.version
                ),
            );
            return None;
        }

        let cols: Vec<String> = text_columns.iter().map(|m| quote_mysql(&m.name)).collect();
        Some(format!(
            "CREATE FULLTEXT INDEX {} ON {} ({});",
            quote_mysql(&derived_name("fulltext", &[&table.name])),
            quote_mysql(&table.name),
            cols.join(", ")
        ))
    }

    /// `CONSTRAINT … FOREIGN KEY …` clause shared by inline and deferred keys.
    fn foreign_key_clause(&self, fk: &ForeignKey) -> String {
        let cols: Vec<String> = fk.columns.iter().map(|c| quote_mysql(c)).collect();
        let ref_cols: Vec<String> = fk.ref_columns.iter().map(|c| quote_mysql(c)).collect();
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_mysql(&foreign_key_name(fk)),
            cols.join(", "),
            quote_mysql(&fk.ref_table),
            ref_cols.join(", "),
            self.map_action(fk, "DELETE", fk.on_delete),
            self.map_action(fk, "UPDATE", fk.on_update)
        )
    }

    fn map_action(&self, fk: &ForeignKey, event: &str, action: ReferentialAction) -> &'static str {
        if action == ReferentialAction::SetDefault {
            self.report.warn(
                WarningKind::Ddl,
                Some(&fk.table),
                format!(
                    "ON {} SET DEFAULT of {} is rejected by InnoDB; using NO ACTION",
                    event,
                    fk.describe()
                ),
            );
            return ReferentialAction::NoAction.as_sql();
        }
        action.as_sql()
    }

    /// `ALTER TABLE … ADD CONSTRAINT` for a key deferred to break a cycle.
    pub fn add_foreign_key(&self, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD {};",
            quote_mysql(&fk.table),
            self.foreign_key_clause(fk)
        )
    }

    /// `CREATE OR REPLACE VIEW` with identifiers requoted for MySQL.
    pub fn create_view(&self, view: &View) -> String {
        if uses_concat_operator(&view.query) {
            self.report.warn(
                WarningKind::Ddl,
                Some(&view.name),
                "view uses ||, which MySQL reads as logical OR unless PIPES_AS_CONCAT is set",
            );
        }
        let columns = if view.columns.is_empty() {
            String::new()
        } else {
            let names: Vec<String> = view.columns.iter().map(|c| quote_mysql(c)).collect();
            format!(" ({})", names.join(", "))
        };
        format!(
            "CREATE OR REPLACE VIEW {}{} AS {};",
            quote_mysql(&view.name),
            columns,
            backtick_identifiers(view.query.trim().trim_end_matches(';').trim_end())
        )
    }
}

/// Name of a foreign key constraint: `fk_<table>_<n>`, n counting from 1.
pub fn foreign_key_name(fk: &ForeignKey) -> String {
    derived_name("fk", &[&fk.table, &(fk.ordinal + 1).to_string()])
}

fn column_definition(m: &ColumnMapping) -> String {
    let mut def = format!("{} {}", quote_mysql(&m.name), m.target_type);
    if !m.is_nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref default) = m.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if m.auto_increment {
        def.push_str(" AUTO_INCREMENT");
    }
    def
}

/// TEXT and BLOB types need a key prefix; VARCHAR does not.
fn needs_prefix(m: &ColumnMapping) -> bool {
    let upper = m.target_type.to_ascii_uppercase();
    m.family.needs_index_prefix() && !upper.starts_with("VARCHAR") && !upper.starts_with("CHAR")
}

fn uses_concat_operator(sql: &str) -> bool {
    let tokens = tokenize(sql);
    tokens.windows(2).any(|pair| {
        pair[0].kind == TokenKind::Punct
            && pair[0].is_punct(sql, '|')
            && pair[1].is_punct(sql, '|')
            && pair[0].end == pair[1].start
    })
}
