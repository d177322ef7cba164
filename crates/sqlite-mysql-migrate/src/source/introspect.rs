//! Schema introspection: catalog rows → [`SchemaModel`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::core::catalog::{CatalogObject, ColumnInfo, ForeignKeyRow, IndexOrigin, ObjectKind};
use crate::core::identifier::{derived_name, validate_identifier};
use crate::core::schema::{
    Affinity, Column, ForeignKey, Index, IndexKind, ReferentialAction, SchemaModel, Table,
    TableOptions, View,
};
use crate::core::traits::SourceReader;
use crate::error::Result;
use crate::report::{ReportHandle, WarningKind};
use crate::trigger::lexer::{find_top_level, matching_paren, split_top_level_commas, tokenize};
use crate::trigger::parse_trigger;

/// Shadow table suffixes of the FTS3/4/5 modules.
const FTS_SHADOW_SUFFIXES: [&str; 8] = [
    "_content", "_data", "_idx", "_docsize", "_config", "_segments", "_segdir", "_stat",
];

/// Reads the source catalog into an immutable schema model.
pub struct SchemaIntrospector {
    source: Arc<dyn SourceReader>,
    config: MigrationConfig,
}

/// Table-level facts parsed from the CREATE TABLE text.
#[derive(Debug, Default, PartialEq, Eq)]
struct TableSqlFlags {
    autoincrement: bool,
    without_rowid: bool,
}

impl SchemaIntrospector {
    pub fn new(source: Arc<dyn SourceReader>, config: MigrationConfig) -> Self {
        Self { source, config }
    }

    /// Build the schema model.
    ///
    /// # Errors
    ///
    /// Catalog read failures and malformed foreign keys are fatal. Objects that
    /// cannot be represented are skipped with a warning instead.
    pub async fn introspect(&self, report: &ReportHandle) -> Result<SchemaModel> {
        let objects = self.source.list_objects().await?;
        let positions: HashMap<String, usize> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.name.to_ascii_lowercase(), i))
            .collect();

        let shadows = fts_shadow_names(&objects);
        let mut schema = SchemaModel::default();

        for (pos, obj) in objects.iter().enumerate() {
            if obj.is_internal() || shadows.contains(&obj.name.to_ascii_lowercase()) {
                debug!("Skipping internal object {}", obj.name);
                continue;
            }
            match obj.kind {
                ObjectKind::Table => {
                    if let Some(table) = self.load_table(obj, pos, &objects, &positions, report).await? {
                        schema.tables.push(table);
                    }
                }
                ObjectKind::View => match obj.sql.as_deref().and_then(view_definition) {
                    Some((columns, query)) => schema.views.push(View {
                        name: obj.name.clone(),
                        columns,
                        query,
                    }),
                    None => report.warn(
                        WarningKind::SkippedObject,
                        None,
                        format!("view {} has no readable definition", obj.name),
                    ),
                },
                ObjectKind::Trigger => {
                    let sql = obj.sql.as_deref().unwrap_or_default();
                    match parse_trigger(&obj.name, &obj.table_name, sql) {
                        Ok(trigger) => schema.triggers.push(trigger),
                        Err(e) => report.warn(
                            WarningKind::SkippedObject,
                            Some(&obj.table_name),
                            e.to_string(),
                        ),
                    }
                }
                // Indexes are loaded per table
                ObjectKind::Index => {}
            }
        }

        resolve_parent_columns(&mut schema);
        self.apply_partition(&mut schema, report);
        schema.validate()?;

        info!(
            "Introspected {} tables, {} views, {} triggers",
            schema.tables.len(),
            schema.views.len(),
            schema.triggers.len()
        );
        Ok(schema)
    }

    async fn load_table(
        &self,
        obj: &CatalogObject,
        catalog_pos: usize,
        objects: &[CatalogObject],
        positions: &HashMap<String, usize>,
        report: &ReportHandle,
    ) -> Result<Option<Table>> {
        validate_identifier(&obj.name)?;
        let sql = obj.sql.as_deref().unwrap_or_default();

        let full_text = match virtual_module(sql) {
            Some(module) if module.starts_with("fts") => true,
            Some(module) => {
                report.warn(
                    WarningKind::SkippedObject,
                    Some(&obj.name),
                    format!("virtual table module {} has no MySQL equivalent", module),
                );
                return Ok(None);
            }
            None => false,
        };

        let flags = table_sql_flags(sql);
        let infos = self.source.table_columns(&obj.name).await?;
        let mut columns = infos
            .iter()
            .map(|info| build_column(info, full_text))
            .collect::<Result<Vec<_>>>()?;

        let mut pk: Vec<&ColumnInfo> = infos.iter().filter(|c| c.pk > 0).collect();
        pk.sort_by_key(|c| c.pk);
        let primary_key: Vec<String> = pk.iter().map(|c| c.name.clone()).collect();

        if primary_key.len() == 1 {
            if let Some(col) = columns.iter_mut().find(|c| c.name == primary_key[0]) {
                let integer_pk = col.declared_type.trim().eq_ignore_ascii_case("INTEGER");
                col.is_rowid_alias = integer_pk && !flags.without_rowid;
                col.is_autoincrement = col.is_rowid_alias && flags.autoincrement;
            }
        }

        if self.config.collect_column_stats && !full_text {
            for col in columns.iter_mut() {
                col.stats = Some(
                    self.source
                        .column_stats(&obj.name, &col.name, col.affinity)
                        .await?,
                );
            }
        }

        let indexes = if full_text {
            Vec::new()
        } else {
            self.load_indexes(&obj.name, objects, positions, report).await?
        };
        let foreign_keys = group_foreign_keys(&obj.name, self.source.foreign_keys(&obj.name).await?);
        let row_count = self.source.row_count(&obj.name).await?;
        debug!("{}: {} columns, {} rows", obj.name, columns.len(), row_count);

        Ok(Some(Table {
            name: obj.name.clone(),
            columns,
            primary_key,
            indexes,
            foreign_keys,
            row_count,
            without_rowid: flags.without_rowid,
            full_text,
            catalog_pos,
            options: TableOptions {
                engine: self.config.engine.clone(),
                charset: self.config.charset.clone(),
                collation: self.config.collation.clone(),
                partition: None,
                tablespace: self.config.tablespace.clone(),
            },
        }))
    }

    async fn load_indexes(
        &self,
        table: &str,
        objects: &[CatalogObject],
        positions: &HashMap<String, usize>,
        report: &ReportHandle,
    ) -> Result<Vec<Index>> {
        let mut indexes: Vec<(usize, Index)> = Vec::new();

        for info in self.source.list_indexes(table).await? {
            if info.origin == IndexOrigin::PrimaryKey {
                continue;
            }
            let columns = self.source.index_columns(&info.name).await?;
            let Some(columns) = columns.into_iter().collect::<Option<Vec<String>>>() else {
                report.warn(
                    WarningKind::SkippedObject,
                    Some(table),
                    format!("expression index {} skipped", info.name),
                );
                continue;
            };

            let (name, mut kind) = match info.origin {
                IndexOrigin::Unique => {
                    let parts: Vec<&str> = std::iter::once(table)
                        .chain(columns.iter().map(String::as_str))
                        .collect();
                    (derived_name("idx", &parts), IndexKind::Unique)
                }
                _ if info.unique => (info.name.clone(), IndexKind::Unique),
                _ => (info.name.clone(), IndexKind::Regular),
            };

            if info.partial {
                let clause = objects
                    .iter()
                    .find(|o| o.kind == ObjectKind::Index && o.name == info.name)
                    .and_then(|o| o.sql.as_deref())
                    .and_then(partial_clause)
                    .unwrap_or_default();
                let mut message = format!("partial index {} loses its WHERE {}", info.name, clause);
                if kind == IndexKind::Unique {
                    kind = IndexKind::Regular;
                    message.push_str(" and its uniqueness");
                }
                report.warn(WarningKind::Ddl, Some(table), message);
            }

            let pos = positions
                .get(&info.name.to_ascii_lowercase())
                .copied()
                .unwrap_or(usize::MAX);
            indexes.push((
                pos,
                Index {
                    name,
                    table: table.to_string(),
                    columns,
                    kind,
                },
            ));
        }

        indexes.sort_by_key(|(pos, _)| *pos);
        Ok(indexes.into_iter().map(|(_, idx)| idx).collect())
    }

    fn apply_partition(&self, schema: &mut SchemaModel, report: &ReportHandle) {
        let Some(clause) = &self.config.partition else {
            return;
        };
        let involved: Vec<bool> = schema
            .tables
            .iter()
            .map(|t| schema.has_fk_involvement(&t.name))
            .collect();
        for (table, involved) in schema.tables.iter_mut().zip(involved) {
            if involved {
                report.warn(
                    WarningKind::Ddl,
                    Some(&table.name),
                    "partition clause skipped, partitioned InnoDB tables cannot take part in foreign keys",
                );
            } else {
                table.options.partition = Some(clause.clone());
            }
        }
    }
}

fn build_column(info: &ColumnInfo, full_text: bool) -> Result<Column> {
    validate_identifier(&info.name)?;
    let declared_type = if full_text && info.declared_type.trim().is_empty() {
        "TEXT".to_string()
    } else {
        info.declared_type.clone()
    };
    Ok(Column {
        name: info.name.clone(),
        affinity: Affinity::from_declared(&declared_type),
        declared_type,
        is_nullable: !info.not_null,
        default: info.default.clone(),
        pk_position: info.pk,
        is_rowid_alias: false,
        is_autoincrement: false,
        ordinal_pos: info.cid + 1,
        stats: None,
    })
}

/// Group `PRAGMA foreign_key_list` rows into constraints in declaration order.
///
/// SQLite numbers constraints from the last declared one, so ids are walked
/// in descending order.
fn group_foreign_keys(table: &str, rows: Vec<ForeignKeyRow>) -> Vec<ForeignKey> {
    let mut groups: BTreeMap<i64, Vec<ForeignKeyRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.id).or_default().push(row);
    }

    groups
        .into_values()
        .rev()
        .enumerate()
        .map(|(ordinal, mut rows)| {
            rows.sort_by_key(|r| r.seq);
            let first = &rows[0];
            ForeignKey {
                ordinal,
                table: table.to_string(),
                ref_table: first.ref_table.clone(),
                on_delete: ReferentialAction::parse(&first.on_delete),
                on_update: ReferentialAction::parse(&first.on_update),
                columns: rows.iter().map(|r| r.from.clone()).collect(),
                ref_columns: rows.iter().filter_map(|r| r.to.clone()).collect(),
            }
        })
        .collect()
}

/// Fill omitted parent column lists with the parent's primary key.
fn resolve_parent_columns(schema: &mut SchemaModel) {
    let keys: HashMap<String, Vec<String>> = schema
        .tables
        .iter()
        .map(|t| (t.name.to_ascii_lowercase(), t.primary_key.clone()))
        .collect();
    for table in schema.tables.iter_mut() {
        for fk in table.foreign_keys.iter_mut() {
            if fk.ref_columns.is_empty() {
                if let Some(pk) = keys.get(&fk.ref_table.to_ascii_lowercase()) {
                    fk.ref_columns = pk.clone();
                }
            }
        }
    }
}

/// Lowercased names of every FTS shadow table in the catalog.
fn fts_shadow_names(objects: &[CatalogObject]) -> HashSet<String> {
    objects
        .iter()
        .filter(|o| o.kind == ObjectKind::Table)
        .filter(|o| {
            o.sql
                .as_deref()
                .and_then(virtual_module)
                .map_or(false, |m| m.starts_with("fts"))
        })
        .flat_map(|o| {
            let base = o.name.to_ascii_lowercase();
            FTS_SHADOW_SUFFIXES.iter().map(move |s| format!("{}{}", base, s))
        })
        .collect()
}

/// Module name of a `CREATE VIRTUAL TABLE … USING module(…)` statement.
fn virtual_module(sql: &str) -> Option<String> {
    let toks = tokenize(sql);
    if !(toks.len() > 3 && toks[1].is_word(sql, "VIRTUAL")) {
        return None;
    }
    let using = toks.iter().position(|t| t.is_word(sql, "USING"))?;
    toks.get(using + 1)
        .map(|t| t.ident(sql).to_ascii_lowercase())
}

fn table_sql_flags(sql: &str) -> TableSqlFlags {
    let toks = tokenize(sql);
    let body_end = toks
        .iter()
        .rposition(|t| t.is_punct(sql, ')'))
        .unwrap_or(toks.len());
    TableSqlFlags {
        autoincrement: toks.iter().any(|t| t.is_word(sql, "AUTOINCREMENT")),
        without_rowid: toks[body_end.min(toks.len())..]
            .windows(2)
            .any(|w| w[0].is_word(sql, "WITHOUT") && w[1].is_word(sql, "ROWID")),
    }
}

/// Column list and defining SELECT of a `CREATE VIEW` statement.
fn view_definition(sql: &str) -> Option<(Vec<String>, String)> {
    let toks = tokenize(sql);
    let as_at = find_top_level(sql, &toks, 0, |t| t.is_word(sql, "AS"))?;
    let query = sql[toks[as_at].end..].trim().trim_end_matches(';').trim_end();
    if query.is_empty() {
        return None;
    }

    let columns = match toks[..as_at].iter().position(|t| t.is_punct(sql, '(')) {
        Some(open) => {
            let close = matching_paren(sql, &toks, open)?;
            split_top_level_commas(sql, &toks[open + 1..close])
                .into_iter()
                .filter_map(|part| part.first().map(|t| t.ident(sql)))
                .collect()
        }
        None => Vec::new(),
    };
    Some((columns, query.to_string()))
}

/// WHERE clause of a `CREATE INDEX` statement.
fn partial_clause(sql: &str) -> Option<String> {
    let toks = tokenize(sql);
    let at = find_top_level(sql, &toks, 0, |t| t.is_word(sql, "WHERE"))?;
    Some(sql[toks[at].end..].trim().to_string())
}
