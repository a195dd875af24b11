// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Relation expressions
//!
//! The planned form of a query: a tree of relational operators over a
//! base table. The layering mirrors what executes where — the unmapped
//! layer is pushed into storage as a native view, everything above it
//! runs in the compiler's interpreted operators.

use std::sync::Arc;

use relq_types::{Cardinality, TupleType};

use relq_expr::key::k;
use relq_expr::{Expr, KeyEncoder, ProjExpr, ProjFlags, RowFilter};
use relq_store::{OrderTerm, QueryPlan, TableRef};

/// A base table reference
#[derive(Clone)]
pub struct TableExpr {
    pub table: TableRef,
    pub row_type: Arc<TupleType>,
}

impl std::fmt::Debug for TableExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableExpr")
            .field("table", &self.table.describe())
            .field("row_type", &self.row_type)
            .finish()
    }
}

/// The planned relational operator tree
#[derive(Debug, Clone)]
pub enum RelationExpr {
    Table(TableExpr),
    Unmapped(UnmappedQueryExpr),
    Mapped(MappedQueryExpr),
    Aggregated(AggregatedQueryExpr),
    Grouped(GroupedQueryExpr),
}

/// The storage-side layer: a native view with the pushed filter and
/// projection. The filter contains no literal constants — planning
/// canonicalizes them into arguments appended after the caller's, so
/// structurally identical queries share one compiled artifact.
#[derive(Debug, Clone)]
pub struct UnmappedQueryExpr {
    pub from: Box<RelationExpr>,
    pub filter: RowFilter,
    pub projection: Vec<ProjExpr>,
    pub row_type: Arc<TupleType>,
    pub cardinality: Cardinality,
}

impl UnmappedQueryExpr {
    /// The query string handed to `Table::view`. The projection block
    /// is omitted when it is the identity over the source row type.
    pub fn view_query(&self) -> String {
        let mut out = String::new();
        if !self.is_identity_projection() {
            out.push('{');
            for (i, proj) in self.projection.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&proj.to_string());
            }
            out.push('}');
        }
        if !self.filter.is_true() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.filter.to_string());
        }
        out
    }

    fn is_identity_projection(&self) -> bool {
        let source = self.from.row_type();
        self.projection.len() == source.len()
            && self
                .projection
                .iter()
                .zip(source.columns())
                .all(|(p, c)| p.flags.is_empty() && p.name == c.name)
    }
}

/// The mapper layer: a per-row filter and projection running in the
/// compiler's operators, above whatever storage pushed down.
#[derive(Debug, Clone)]
pub struct MappedQueryExpr {
    pub from: Box<RelationExpr>,
    pub filter: Option<Expr>,
    pub projection: Vec<ProjExpr>,
    /// Ordering applied after the mapper, for order-by over derived
    /// columns
    pub sort: Vec<OrderTerm>,
    /// Order-by columns carried for sorting but stripped from the
    /// result
    pub strip: Vec<String>,
    pub row_type: Arc<TupleType>,
    pub cardinality: Cardinality,
}

/// The aggregation layer: one output row per group
#[derive(Debug, Clone)]
pub struct AggregatedQueryExpr {
    pub from: Box<RelationExpr>,
    /// Count of leading projection columns partitioning the input;
    /// zero aggregates everything into one group
    pub group_by: usize,
    pub projection: Vec<ProjExpr>,
    /// Group filter, evaluated in the finish context
    pub filter: Option<Expr>,
    pub row_type: Arc<TupleType>,
    pub cardinality: Cardinality,
}

impl AggregatedQueryExpr {
    /// Source column names of the partitioning projections.
    pub fn group_columns(&self) -> Vec<String> {
        self.projection[..self.group_by]
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }
}

/// The window layer: one output row per input row
#[derive(Debug, Clone)]
pub struct GroupedQueryExpr {
    pub from: Box<RelationExpr>,
    /// Count of leading projection columns partitioning the input
    pub group_by: usize,
    /// Intra-partition ordering the frames depend on
    pub order_by: Vec<OrderTerm>,
    pub projection: Vec<ProjExpr>,
    /// The ordering column driving GROUPS/RANGE frames
    pub order_key: Option<(Expr, bool)>,
    pub row_type: Arc<TupleType>,
    pub cardinality: Cardinality,
}

impl GroupedQueryExpr {
    /// RANGE and GROUPS frames compute relative to the upstream
    /// ordering; such plans must not lose it.
    pub fn is_order_dependent(&self) -> bool {
        self.order_key.is_some()
    }
}

impl RelationExpr {
    pub fn row_type(&self) -> Arc<TupleType> {
        match self {
            RelationExpr::Table(t) => Arc::clone(&t.row_type),
            RelationExpr::Unmapped(e) => Arc::clone(&e.row_type),
            RelationExpr::Mapped(e) => Arc::clone(&e.row_type),
            RelationExpr::Aggregated(e) => Arc::clone(&e.row_type),
            RelationExpr::Grouped(e) => Arc::clone(&e.row_type),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            RelationExpr::Table(_) => Cardinality::Many,
            RelationExpr::Unmapped(e) => e.cardinality,
            RelationExpr::Mapped(e) => e.cardinality,
            RelationExpr::Aggregated(e) => e.cardinality,
            RelationExpr::Grouped(e) => e.cardinality,
        }
    }

    /// Canonical cache-key encoding of the planned tree. Table
    /// references encode by identity, everything else structurally.
    pub fn encode_key(&self, enc: &mut KeyEncoder) {
        match self {
            RelationExpr::Table(t) => {
                enc.write_u8(k::TABLE);
                let identity = Arc::as_ptr(&t.table) as *const () as usize;
                enc.write_varint(identity as u64);
                enc.write_tuple_type(&t.row_type);
            }
            RelationExpr::Unmapped(e) => {
                enc.write_u8(k::QUERY_UNMAPPED);
                e.from.encode_key(enc);
                e.filter.encode_key(enc);
                encode_projection(enc, &e.projection);
            }
            RelationExpr::Mapped(e) => {
                enc.write_u8(k::QUERY_MAPPED);
                e.from.encode_key(enc);
                match &e.filter {
                    Some(f) => {
                        enc.write_bool(true);
                        f.encode_key(enc);
                    }
                    None => enc.write_bool(false),
                }
                encode_projection(enc, &e.projection);
                enc.write_varint(e.sort.len() as u64);
                for term in &e.sort {
                    enc.write_str(&term.printed());
                }
            }
            RelationExpr::Aggregated(e) => {
                enc.write_u8(k::QUERY_AGGREGATED);
                e.from.encode_key(enc);
                enc.write_varint(e.group_by as u64);
                match &e.filter {
                    Some(f) => {
                        enc.write_bool(true);
                        f.encode_key(enc);
                    }
                    None => enc.write_bool(false),
                }
                encode_projection(enc, &e.projection);
            }
            RelationExpr::Grouped(e) => {
                enc.write_u8(k::QUERY_GROUPED);
                e.from.encode_key(enc);
                enc.write_varint(e.group_by as u64);
                enc.write_varint(e.order_by.len() as u64);
                for term in &e.order_by {
                    enc.write_str(&term.printed());
                }
                encode_projection(enc, &e.projection);
            }
        }
    }

    /// Plan explanation for this tree.
    pub fn explain(&self) -> QueryPlan {
        match self {
            RelationExpr::Table(t) => t.table.scan_plan(),
            RelationExpr::Unmapped(e) => QueryPlan::View {
                query: e.view_query(),
                source: Box::new(e.from.explain()),
            },
            RelationExpr::Mapped(e) => {
                let map = QueryPlan::Map {
                    filter: e.filter.as_ref().map(|f| f.to_string()),
                    projection: e.projection.iter().map(|p| p.to_string()).collect(),
                    source: Box::new(e.from.explain()),
                };
                if e.sort.is_empty() {
                    map
                } else {
                    QueryPlan::Sort {
                        order: e.sort.iter().map(OrderTerm::printed).collect(),
                        source: Box::new(map),
                    }
                }
            }
            RelationExpr::Aggregated(e) => QueryPlan::Aggregate {
                group_by: e.group_columns(),
                source: Box::new(e.from.explain()),
            },
            RelationExpr::Grouped(e) => QueryPlan::Group {
                partition: e.projection[..e.group_by]
                    .iter()
                    .map(|p| p.name.clone())
                    .collect(),
                order: e.order_by.iter().map(OrderTerm::printed).collect(),
                source: Box::new(e.from.explain()),
            },
        }
    }
}

fn encode_projection(enc: &mut KeyEncoder, projection: &[ProjExpr]) {
    enc.write_varint(projection.len() as u64);
    for proj in projection {
        enc.write_u8(k::PROJ);
        enc.write_str(&proj.name);
        enc.write_u8(proj.flags.bits());
        proj.expr.encode_key(enc);
    }
}

/// Ordering terms from the ORDER_BY-flagged projections, in projection
/// order.
pub fn order_terms(projection: &[ProjExpr]) -> Vec<OrderTerm> {
    projection
        .iter()
        .filter(|p| p.is_order_by())
        .map(|p| OrderTerm {
            column: p.name.clone(),
            descending: p.flags.contains(ProjFlags::DESCENDING),
            null_low: p.flags.contains(ProjFlags::NULL_LOW),
        })
        .collect()
}
