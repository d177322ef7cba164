//! Table creation order from foreign key dependencies.
//!
//! Tables are sorted with Kahn's algorithm (ties broken by catalog order).
//! When only cycles remain, the cycle edge with the smallest child table name
//! is deferred to a post-creation `ALTER TABLE … ADD FOREIGN KEY` and the sort
//! continues. Self-referencing keys never form an edge.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::schema::{ForeignKey, SchemaModel};
use crate::error::Result;
use crate::report::{ReportHandle, WarningKind};

/// Result of dependency resolution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedOrder {
    /// Table names in creation order.
    pub order: Vec<String>,
    /// Tables grouped by dependency depth; tables within a level never depend
    /// on each other through non-deferred keys.
    pub levels: Vec<Vec<String>>,
    /// Keys applied after all tables exist, in declaration order.
    pub deferred: Vec<ForeignKey>,
}

impl ResolvedOrder {
    /// Whether a key is applied after creation rather than inline.
    pub fn is_deferred(&self, fk: &ForeignKey) -> bool {
        self.deferred
            .iter()
            .any(|d| d.table == fk.table && d.ordinal == fk.ordinal)
    }
}

/// One dependency edge: `child` depends on `parent`.
#[derive(Debug, Clone)]
struct Edge {
    /// Position in `SchemaModel::foreign_keys()`.
    fk: usize,
    child: usize,
    parent: usize,
    removed: bool,
}

/// Orders tables so parents are created before their children.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the creation order.
    ///
    /// # Errors
    ///
    /// Only a malformed schema (a key referencing a missing table or column)
    /// is fatal. Cycles are broken and reported.
    pub fn resolve(&self, schema: &SchemaModel, report: &ReportHandle) -> Result<ResolvedOrder> {
        schema.validate()?;

        let fks: Vec<&ForeignKey> = schema.foreign_keys().collect();
        let mut edges: Vec<Edge> = Vec::new();
        for (i, fk) in fks.iter().enumerate() {
            if fk.is_self_referencing() {
                continue;
            }
            // validate() guarantees both endpoints exist
            if let (Some(child), Some(parent)) =
                (schema.table_index(&fk.table), schema.table_index(&fk.ref_table))
            {
                edges.push(Edge {
                    fk: i,
                    child,
                    parent,
                    removed: false,
                });
            }
        }

        let n = schema.tables.len();
        let mut in_degree = vec![0usize; n];
        for edge in &edges {
            in_degree[edge.child] += 1;
        }
        let mut done = vec![false; n];
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut deferred: Vec<usize> = Vec::new();

        while order.len() < n {
            // Catalog order == table index
            let next = (0..n).find(|&t| !done[t] && in_degree[t] == 0);
            match next {
                Some(t) => {
                    done[t] = true;
                    order.push(t);
                    for edge in edges.iter().filter(|e| !e.removed && e.parent == t) {
                        in_degree[edge.child] -= 1;
                    }
                }
                None => {
                    let Some(victim) = pick_cycle_edge(schema, &edges, &done, &fks) else {
                        // Unreachable for a consistent graph; keep the output total
                        break;
                    };
                    let edge = &mut edges[victim];
                    edge.removed = true;
                    in_degree[edge.child] -= 1;
                    deferred.push(edge.fk);

                    let fk = fks[edge.fk];
                    report.warn(
                        WarningKind::CycleBreak,
                        Some(&fk.table),
                        format!(
                            "foreign key {} deferred to break a dependency cycle",
                            fk.describe()
                        ),
                    );
                }
            }
        }

        // Any table left by an inconsistent graph still gets emitted
        order.extend((0..n).filter(|&t| !done[t]));

        let levels = compute_levels(&order, &edges, n);
        deferred.sort_unstable();

        let resolved = ResolvedOrder {
            order: order.iter().map(|&t| schema.tables[t].name.clone()).collect(),
            levels: levels
                .into_iter()
                .map(|level| {
                    level
                        .into_iter()
                        .map(|t| schema.tables[t].name.clone())
                        .collect()
                })
                .collect(),
            deferred: deferred.into_iter().map(|i| fks[i].clone()).collect(),
        };
        info!(
            "Resolved {} tables into {} levels, {} deferred foreign keys",
            resolved.order.len(),
            resolved.levels.len(),
            resolved.deferred.len()
        );
        debug!("Creation order: {:?}", resolved.order);
        Ok(resolved)
    }
}

/// Choose the edge to defer among the edges that lie on a cycle of the
/// remaining graph: smallest child table name, then declaration ordinal.
fn pick_cycle_edge(
    schema: &SchemaModel,
    edges: &[Edge],
    done: &[bool],
    fks: &[&ForeignKey],
) -> Option<usize> {
    let live = |e: &Edge| !e.removed && !done[e.child] && !done[e.parent];

    edges
        .iter()
        .enumerate()
        .filter(|(_, e)| live(e) && reaches(edges, done, e.parent, e.child))
        .min_by(|(_, a), (_, b)| {
            let name_a = &schema.tables[a.child].name;
            let name_b = &schema.tables[b.child].name;
            name_a
                .cmp(name_b)
                .then(fks[a.fk].ordinal.cmp(&fks[b.fk].ordinal))
                .then(a.fk.cmp(&b.fk))
        })
        .map(|(i, _)| i)
}

/// Whether `to` is reachable from `from` following depends-on edges among
/// unfinished tables.
fn reaches(edges: &[Edge], done: &[bool], from: usize, to: usize) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        stack.extend(
            edges
                .iter()
                .filter(|e| !e.removed && e.child == node && !done[e.parent])
                .map(|e| e.parent),
        );
    }
    false
}

/// Group tables by longest dependency chain through non-deferred edges.
fn compute_levels(order: &[usize], edges: &[Edge], n: usize) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; n];
    for &t in order {
        depth[t] = edges
            .iter()
            .filter(|e| !e.removed && e.child == t)
            .map(|e| depth[e.parent] + 1)
            .max()
            .unwrap_or(0);
    }
    let max_depth = order.iter().map(|&t| depth[t]).max().map_or(0, |d| d + 1);
    let mut levels = vec![Vec::new(); max_depth];
    for &t in order {
        levels[depth[t]].push(t);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::test_support::*;
    use crate::core::schema::Table;

    fn table(name: &str, pos: usize, fks: &[(&str, &str)]) -> Table {
        let mut t = make_test_table(
            name,
            vec![make_pk_column("id", "INTEGER"), make_test_column("ref_id", "INTEGER")],
        );
        t.catalog_pos = pos;
        for (i, (col, parent)) in fks.iter().enumerate() {
            let mut fk = make_fk(name, col, parent, "id");
            fk.ordinal = i;
            t.foreign_keys.push(fk);
        }
        t
    }

    fn schema(tables: Vec<Table>) -> SchemaModel {
        SchemaModel {
            tables,
            ..Default::default()
        }
    }

    fn resolve(schema: &SchemaModel) -> (ResolvedOrder, ReportHandle) {
        let report = ReportHandle::new();
        let resolved = DependencyResolver::new().resolve(schema, &report).unwrap();
        (resolved, report)
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|t| t == name).unwrap()
    }

    #[test]
    fn test_parent_before_child() {
        let s = schema(vec![
            table("child", 0, &[("ref_id", "parent")]),
            table("parent", 1, &[]),
        ]);
        let (resolved, report) = resolve(&s);
        assert_eq!(resolved.order, vec!["parent", "child"]);
        assert_eq!(resolved.levels, vec![vec!["parent"], vec!["child"]]);
        assert!(resolved.deferred.is_empty());
        assert!(report.snapshot().warnings.is_empty());
    }

    #[test]
    fn test_independent_tables_keep_catalog_order() {
        let s = schema(vec![
            table("zeta", 0, &[]),
            table("alpha", 1, &[]),
            table("mid", 2, &[]),
        ]);
        let (resolved, _) = resolve(&s);
        assert_eq!(resolved.order, vec!["zeta", "alpha", "mid"]);
        assert_eq!(resolved.levels.len(), 1);
    }

    #[test]
    fn test_acyclic_graph_orders_every_edge() {
        let s = schema(vec![
            table("d", 0, &[("ref_id", "b"), ("ref_id", "c")]),
            table("c", 1, &[("ref_id", "a")]),
            table("b", 2, &[("ref_id", "a")]),
            table("e", 3, &[("ref_id", "d")]),
            table("a", 4, &[]),
            table("f", 5, &[]),
        ]);
        let (resolved, _) = resolve(&s);
        assert_eq!(resolved.order.len(), 6);
        for fk in s.foreign_keys() {
            assert!(position(&resolved.order, &fk.ref_table) < position(&resolved.order, &fk.table));
        }
        assert!(resolved.deferred.is_empty());
        assert_eq!(resolved.levels[0], vec!["a", "f"]);
    }

    #[test]
    fn test_two_table_cycle() {
        let s = schema(vec![
            table("b", 0, &[("ref_id", "a")]),
            table("a", 1, &[("ref_id", "b")]),
        ]);
        let (resolved, report) = resolve(&s);
        assert_eq!(resolved.order, vec!["a", "b"]);
        assert_eq!(resolved.deferred.len(), 1);
        assert_eq!(resolved.deferred[0].table, "a");
        assert_eq!(report.snapshot().warnings_of(WarningKind::CycleBreak).count(), 1);

        // Running again gives the same result
        let (again, _) = resolve(&s);
        assert_eq!(again.order, resolved.order);
    }

    #[test]
    fn test_cycle_with_tail_restores_all_keys() {
        // x -> y -> z -> x, plus w -> x outside the cycle
        let s = schema(vec![
            table("w", 0, &[("ref_id", "x")]),
            table("x", 1, &[("ref_id", "y")]),
            table("y", 2, &[("ref_id", "z")]),
            table("z", 3, &[("ref_id", "x")]),
        ]);
        let (resolved, _) = resolve(&s);
        assert_eq!(resolved.order.len(), 4);
        assert_eq!(resolved.deferred.len(), 1);
        assert_eq!(resolved.deferred[0].table, "x");

        for fk in s.foreign_keys() {
            if !resolved.is_deferred(fk) {
                assert!(
                    position(&resolved.order, &fk.ref_table) < position(&resolved.order, &fk.table),
                    "{} violated",
                    fk.describe()
                );
            }
        }
    }

    #[test]
    fn test_self_reference_is_inline() {
        let s = schema(vec![table("node", 0, &[("ref_id", "node")])]);
        let (resolved, report) = resolve(&s);
        assert_eq!(resolved.order, vec!["node"]);
        assert!(resolved.deferred.is_empty());
        assert!(report.snapshot().warnings.is_empty());
    }

    #[test]
    fn test_deferred_in_declaration_order() {
        // Two independent cycles; the later-declared one is broken first by name
        let s = schema(vec![
            table("q", 0, &[("ref_id", "p")]),
            table("p", 1, &[("ref_id", "q")]),
            table("b", 2, &[("ref_id", "a")]),
            table("a", 3, &[("ref_id", "b")]),
        ]);
        let (resolved, _) = resolve(&s);
        let deferred: Vec<&str> = resolved.deferred.iter().map(|f| f.table.as_str()).collect();
        assert_eq!(deferred, vec!["p", "a"]);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let mut t = table("child", 0, &[]);
        t.foreign_keys.push(make_fk("child", "nope", "child", "id"));
        let s = schema(vec![t]);
        let report = ReportHandle::new();
        assert!(DependencyResolver::new().resolve(&s, &report).is_err());
    }
}
