// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Compiled queries
//!
//! A [`CompiledQuery`] pairs a shared, cached [`PlanArtifact`] with the
//! canonicalized literal arguments of the query text it came from.
//! `table(args)` composes the artifact's operator tree over the base
//! table: native views for the pushed layer, interpreted mapper, sort,
//! aggregation and window tables above it.

use std::sync::Arc;

use relq_types::{Row, TupleType, Value};

use relq_engine::{eval, eval_filter, CompiledAggregate, CompiledGroup, EvalContext};
use relq_expr::{Expr, KeyEncoder, ProjExpr};
use relq_store::{
    aggregate, group, OrderTerm, QueryPlan, Scanner, StoreError, StoreResult, Table, TableRef,
    Updater, VecScanner,
};

use crate::error::{PlanError, PlanResult};
use crate::relation::{MappedQueryExpr, RelationExpr};

/// The shared, cache-held form of a planned query
pub struct PlanArtifact {
    pub(crate) root: RelationExpr,
    pub(crate) row_type: Arc<TupleType>,
    pub(crate) user_arg_count: usize,
    pub(crate) key: Vec<u8>,
}

impl PlanArtifact {
    pub fn new(root: RelationExpr, user_arg_count: usize) -> Arc<PlanArtifact> {
        let row_type = root.row_type();
        let mut enc = KeyEncoder::new();
        root.encode_key(&mut enc);
        Arc::new(PlanArtifact {
            root,
            row_type,
            user_arg_count,
            key: enc.finish(),
        })
    }

    /// Canonical cache key of the planned tree.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// A reusable compiled query
pub struct CompiledQuery {
    artifact: Arc<PlanArtifact>,
    extra_args: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(artifact: Arc<PlanArtifact>, extra_args: Vec<Value>) -> Self {
        Self {
            artifact,
            extra_args,
        }
    }

    /// The result row shape.
    pub fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.artifact.row_type)
    }

    /// Minimum number of caller arguments.
    pub fn argument_count(&self) -> usize {
        self.artifact.user_arg_count
    }

    /// The shared artifact backing this query; queries differing only
    /// in literal values share one.
    pub fn artifact(&self) -> &Arc<PlanArtifact> {
        &self.artifact
    }

    /// Materialize the result as a reusable table.
    pub fn table(&self, args: &[Value]) -> PlanResult<TableRef> {
        if args.len() < self.artifact.user_arg_count {
            return Err(PlanError::ArgumentCount {
                required: self.artifact.user_arg_count,
                supplied: args.len(),
            });
        }
        let mut full_args = args.to_vec();
        full_args.extend(self.extra_args.iter().cloned());
        build(&self.artifact.root, &full_args)
    }

    /// Convenience delegate: a scanner over the result.
    pub fn new_scanner(&self, args: &[Value]) -> PlanResult<Box<dyn Scanner>> {
        let mut full_args = args.to_vec();
        full_args.extend(self.extra_args.iter().cloned());
        Ok(self.table(args)?.new_scanner(&full_args)?)
    }

    /// Convenience delegate: an updater over the result. Derived
    /// layers are read-only.
    pub fn new_updater(&self, args: &[Value]) -> PlanResult<Box<dyn Updater>> {
        match &self.artifact.root {
            RelationExpr::Mapped(_) | RelationExpr::Aggregated(_) | RelationExpr::Grouped(_) => {
                Err(PlanError::ReadOnlyView(
                    "mapped, aggregated and grouped results are not updatable".into(),
                ))
            }
            _ => {
                let mut full_args = args.to_vec();
                full_args.extend(self.extra_args.iter().cloned());
                Ok(self.table(args)?.new_updater(&full_args)?)
            }
        }
    }

    /// Explanation of the scan this query performs.
    pub fn scanner_plan(&self) -> QueryPlan {
        self.artifact.root.explain()
    }

    /// Explanation of the updater path; identical shape to the scan.
    pub fn updater_plan(&self) -> QueryPlan {
        self.artifact.root.explain()
    }
}

/// Compose the operator tree over the base table.
fn build(rel: &RelationExpr, args: &[Value]) -> PlanResult<TableRef> {
    match rel {
        RelationExpr::Table(t) => Ok(Arc::clone(&t.table)),
        RelationExpr::Unmapped(u) => {
            let source = build(&u.from, args)?;
            let query = u.view_query();
            tracing::debug!(%query, "pushing view to storage");
            Ok(source.view(&query, args)?)
        }
        RelationExpr::Mapped(m) => {
            let source = build(&m.from, args)?;
            Ok(build_mapped(m, source, args)?)
        }
        RelationExpr::Aggregated(a) => {
            let source = build(&a.from, args)?;
            let compiled = CompiledAggregate::build(
                source.row_type(),
                Arc::clone(&a.row_type),
                &a.projection,
                a.filter.as_ref(),
                args.to_vec(),
            );
            Ok(aggregate(
                source,
                &a.group_columns(),
                Arc::clone(&a.row_type),
                compiled.factory(),
            ))
        }
        RelationExpr::Grouped(g) => {
            let source = build(&g.from, args)?;
            let compiled = CompiledGroup::build(
                source.row_type(),
                Arc::clone(&g.row_type),
                &g.projection,
                g.order_key.clone(),
                args.to_vec(),
            )
            .map_err(StoreError::from)?;
            let partition: Vec<String> = g.projection[..g.group_by]
                .iter()
                .map(|p| p.name.clone())
                .collect();
            Ok(group(
                source,
                &partition,
                &g.order_by,
                Arc::clone(&g.row_type),
                compiled.factory(),
            ))
        }
    }
}

fn build_mapped(
    m: &MappedQueryExpr,
    source: TableRef,
    args: &[Value],
) -> StoreResult<TableRef> {
    // The mapper emits every projection, carriers included; sorting
    // happens over that shape, stripping after.
    let full_columns: Vec<relq_types::Column> = m
        .projection
        .iter()
        .map(|p| relq_types::Column::new(p.name.clone(), p.expr.ty()))
        .collect();
    let full_type = Arc::new(relq_types::TupleType::new(full_columns)?);

    let mut table: TableRef = Arc::new(MappedTable {
        source,
        filter: m.filter.clone(),
        projection: m.projection.clone(),
        row_type: Arc::clone(&full_type),
        args: args.to_vec(),
    });
    if !m.sort.is_empty() {
        table = Arc::new(SortedTable {
            source: table,
            order: m.sort.clone(),
        });
    }
    if !m.strip.is_empty() {
        table = Arc::new(ProjectedTable {
            source: table,
            row_type: Arc::clone(&m.row_type),
        });
    }
    Ok(table)
}

/// Row-by-row filter and projection over a source table
struct MappedTable {
    source: TableRef,
    filter: Option<Expr>,
    projection: Vec<ProjExpr>,
    row_type: Arc<TupleType>,
    args: Vec<Value>,
}

impl Table for MappedTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.row_type)
    }

    fn new_scanner(&self, _args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        Ok(Box::new(MappedScanner {
            source: self.source.new_scanner(&self.args)?,
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            row_type: Arc::clone(&self.row_type),
            args: self.args.clone(),
        }))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(StoreError::Unsupported(format!(
            "mapped table cannot view {query:?} natively"
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Map {
            filter: self.filter.as_ref().map(|f| f.to_string()),
            projection: self.projection.iter().map(|p| p.to_string()).collect(),
            source: Box::new(self.source.scan_plan()),
        }
    }

    fn describe(&self) -> String {
        format!("map({})", self.source.describe())
    }
}

struct MappedScanner {
    source: Box<dyn Scanner>,
    filter: Option<Expr>,
    projection: Vec<ProjExpr>,
    row_type: Arc<TupleType>,
    args: Vec<Value>,
}

impl Scanner for MappedScanner {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        loop {
            let Some(row) = self.source.step()? else {
                return Ok(None);
            };
            let mut cx = EvalContext::new(&row, &self.args);
            if let Some(filter) = &self.filter {
                if !eval_filter(filter, &mut cx)? {
                    continue;
                }
            }
            let mut target = Row::null_row(Arc::clone(&self.row_type));
            for (i, proj) in self.projection.iter().enumerate() {
                let value = eval(&proj.expr, &mut cx)?;
                let column = self.row_type.column(i);
                if value.is_null() && !column.ty.is_nullable() {
                    return Err(relq_types::EvalError::NullNotAllowed(proj.name.clone()).into());
                }
                target.set(i, value.convert(&column.ty).map_err(relq_types::EvalError::from)?);
            }
            return Ok(Some(target));
        }
    }
}

/// Materializing sort over a source table
struct SortedTable {
    source: TableRef,
    order: Vec<OrderTerm>,
}

impl Table for SortedTable {
    fn row_type(&self) -> Arc<TupleType> {
        self.source.row_type()
    }

    fn new_scanner(&self, args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        let mut scanner = self.source.new_scanner(args)?;
        let mut rows = Vec::new();
        while let Some(row) = scanner.step()? {
            rows.push(row);
        }
        let row_type = self.source.row_type();
        let indexes: Vec<(usize, bool, bool)> = self
            .order
            .iter()
            .filter_map(|t| {
                row_type
                    .index_of(&t.column)
                    .map(|i| (i, t.descending, t.null_low))
            })
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, &indexes));
        Ok(Box::new(VecScanner::new(rows)))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(StoreError::Unsupported(format!(
            "sorted table cannot view {query:?} natively"
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Sort {
            order: self.order.iter().map(OrderTerm::printed).collect(),
            source: Box::new(self.source.scan_plan()),
        }
    }

    fn describe(&self) -> String {
        format!("sort({})", self.source.describe())
    }
}

/// Ordering comparator over row values. Nulls order high unless the
/// term says low; descending flips the comparison, not the null rule.
pub fn compare_rows(a: &Row, b: &Row, order: &[(usize, bool, bool)]) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for &(index, descending, null_low) in order {
        let (va, vb) = (a.get(index), b.get(index));
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                if null_low {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, true) => {
                if null_low {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, false) => {
                let ord = va.compare(vb).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// Name-based projection dropping carried columns
struct ProjectedTable {
    source: TableRef,
    row_type: Arc<TupleType>,
}

impl Table for ProjectedTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.row_type)
    }

    fn new_scanner(&self, args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        Ok(Box::new(ProjectedScanner {
            source: self.source.new_scanner(args)?,
            row_type: Arc::clone(&self.row_type),
        }))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(StoreError::Unsupported(format!(
            "projected table cannot view {query:?} natively"
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Map {
            filter: None,
            projection: self
                .row_type
                .columns()
                .iter()
                .map(|c| c.name.clone())
                .collect(),
            source: Box::new(self.source.scan_plan()),
        }
    }

    fn describe(&self) -> String {
        format!("project({})", self.source.describe())
    }
}

struct ProjectedScanner {
    source: Box<dyn Scanner>,
    row_type: Arc<TupleType>,
}

impl Scanner for ProjectedScanner {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        match self.source.step()? {
            Some(row) => Ok(Some(row.project(&self.row_type)?)),
            None => Ok(None),
        }
    }
}
