// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The query planner
//!
//! Turns a parsed `{projection} filter` query into the layered
//! [`RelationExpr`] pipeline:
//!
//! 1. Drop a constant-true filter, require boolean otherwise.
//! 2. Expand the wildcard and apply exclusions.
//! 3. Compute the minimum source projection: the columns the final
//!    projection needs plus whatever a remaining filter reads, with
//!    ordering flags attached to plain source columns (order-by
//!    columns survive the pushed layer even when excluded — sorting
//!    needs them, and they are stripped afterwards).
//! 4. Lower the filter, normalize to conjunctive form (unless that
//!    would duplicate a non-pure call), and split it into the pushable
//!    part and the remainder.
//! 5. Canonicalize literals in the pushed part into appended
//!    arguments, so structurally identical queries share one artifact.
//! 6. Layer `Unmapped` → `Mapped` → `Aggregated`/`Grouped` as the
//!    query demands, propagating cardinality.

use std::collections::HashSet;
use std::sync::Arc;

use relq_types::{Cardinality, Column, TupleType, Type, Value};

use relq_expr::{
    ColumnExpr, Expr, FunctionFinder, ParamExpr, ProjExpr, ProjFlags, RowFilter, Span,
    WindowAssignments,
};
use relq_parse::ParsedQuery;
use relq_store::{OrderTerm, TableRef};

use crate::error::{PlanError, PlanResult};
use crate::relation::{
    order_terms, AggregatedQueryExpr, GroupedQueryExpr, MappedQueryExpr, RelationExpr, TableExpr,
    UnmappedQueryExpr,
};

/// A planned query: the operator tree plus the argument bookkeeping
/// that stays outside the shared artifact.
#[derive(Debug)]
pub struct PlannedQuery {
    pub root: RelationExpr,
    /// Arguments the caller must supply
    pub user_arg_count: usize,
    /// Literal values appended after the caller's arguments
    pub extra_args: Vec<Value>,
}

/// Plan a parsed query against a base table.
pub fn plan(
    table: TableRef,
    parsed: &ParsedQuery,
    finder: &dyn FunctionFinder,
) -> PlanResult<PlannedQuery> {
    let source_type = table.row_type();

    // Normalize the filter: drop constant truth, demand boolean.
    let filter = match &parsed.filter {
        Some(f) if f.is_const_true() => None,
        Some(f) => {
            let ty = f.ty();
            if !ty.is_boolean() && ty != Type::Any {
                return Err(relq_expr::ExprError::TypeMismatch {
                    message: format!("filter must be boolean, found {ty}"),
                    span: f.span(),
                }
                .into());
            }
            Some(f.clone())
        }
        None => None,
    };

    let projection = expand_projection(&source_type, parsed)?;

    let user_arg_count = projection
        .iter()
        .map(|p| p.expr.max_argument())
        .chain(filter.as_ref().map(Expr::max_argument))
        .max()
        .unwrap_or(0);

    // Lower and split the filter.
    let mut filter_columns = Vec::new();
    let row_filter = filter
        .as_ref()
        .map(|f| f.to_row_filter(&mut filter_columns))
        .unwrap_or(RowFilter::True);
    let normalized = row_filter.cnf();
    let available = |name: &str| source_type.try_column_for(name).is_some();
    let [pushed, remainder] = normalized.split(&available);
    let remainder = (!remainder.is_true()).then(|| remainder.to_expr(Span::default()));
    tracing::debug!(
        pushed = %pushed,
        remainder = remainder.as_ref().map(|r| r.to_string()).unwrap_or_default(),
        "split filter"
    );

    // Canonicalize literals in the pushed part.
    let mut extra_args = Vec::new();
    let pushed = canonicalize_literals(pushed, user_arg_count, &mut extra_args);

    let windowed = projection.iter().any(|p| p.expr.has_window_call());
    let aggregated = !windowed && projection.iter().any(|p| p.expr.is_aggregating());

    let from_projection = compute_from_projection(&source_type, &projection, remainder.as_ref());

    let from = make_unmapped(table, &source_type, from_projection, pushed)?;

    let root = if aggregated {
        make_aggregated(from, projection, remainder, finder)?
    } else if windowed {
        make_grouped(from, projection, remainder, finder)?
    } else {
        make_mapped(from, projection, remainder)?
    };

    Ok(PlannedQuery {
        root,
        user_arg_count,
        extra_args,
    })
}

/// Expand the wildcard, apply pure exclusions, and reject projection
/// shapes the planner cannot honor.
fn expand_projection(
    source_type: &Arc<TupleType>,
    parsed: &ParsedQuery,
) -> PlanResult<Vec<ProjExpr>> {
    let all_columns = |span: Span| -> PlanResult<Vec<ProjExpr>> {
        source_type
            .columns()
            .iter()
            .map(|col| {
                let expr = Expr::Column(ColumnExpr::resolve(
                    span,
                    Arc::clone(source_type),
                    vec![col.name.clone()],
                )?);
                Ok(ProjExpr::make(span, col.name.clone(), ProjFlags::default(), expr)?)
            })
            .collect()
    };

    let Some(parsed_projection) = &parsed.projection else {
        return all_columns(Span::default());
    };

    let named: HashSet<&str> = parsed_projection
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    let mut expanded = Vec::new();
    for proj in parsed_projection {
        let wildcard = matches!(&proj.expr, Expr::Column(c) if c.is_wildcard());
        if wildcard {
            for col in all_columns(proj.span)? {
                if !named.contains(col.name.as_str()) {
                    expanded.push(col);
                }
            }
        } else {
            expanded.push(proj.clone());
        }
    }

    // A pure exclusion drops the column; excluding something absent is
    // an error.
    let mut result = Vec::new();
    for proj in expanded {
        if proj.is_excluded() && !proj.is_order_by() {
            if source_type.try_column_for(&proj.name).is_none() {
                return Err(relq_expr::ExprError::DuplicateBinding {
                    name: proj.name.clone(),
                    span: proj.span,
                }
                .into());
            }
            continue;
        }
        result.push(proj);
    }
    Ok(result)
}

/// The minimum set of source columns the upper layers need, as pushed
/// projections with ordering flags on plain source columns.
///
/// Order: projection-named columns first (projection order), then
/// columns only the remaining filter reads, in source order.
fn compute_from_projection(
    source_type: &Arc<TupleType>,
    projection: &[ProjExpr],
    remainder: Option<&Expr>,
) -> Vec<ProjExpr> {
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |name: &str, names: &mut Vec<String>, seen: &mut HashSet<String>| {
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    };

    for proj in projection {
        proj.expr.gather_eval_columns(&mut |c| {
            if let Some(base) = c.base_name() {
                push(base, &mut names, &mut seen);
            }
        });
    }
    if let Some(filter) = remainder {
        filter.gather_eval_columns(&mut |c| {
            if let Some(base) = c.base_name() {
                push(base, &mut names, &mut seen);
            }
        });
    }

    // Ordering flags push down wherever the ordered projection is a
    // plain source column; aggregation and windowing depend on the
    // upstream order, so the flags ride the pushed layer.
    let mut order_flags: Vec<(String, ProjFlags)> = Vec::new();
    for proj in projection {
        if proj.is_order_by() {
            if let Expr::Column(c) = &proj.expr {
                if let Some(base) = c.base_name() {
                    order_flags.push((base.to_string(), proj.flags.without(ProjFlags::EXCLUDE)));
                }
            }
        }
    }

    // A projection of pure computations (count(), constants) still has
    // to scan rows; carry the first source column.
    if names.is_empty() {
        if let Some(col) = source_type.columns().first() {
            names.push(col.name.clone());
        }
    }

    names
        .into_iter()
        .map(|name| {
            let flags = order_flags
                .iter()
                .find(|(n, _)| n == &name)
                .map(|(_, f)| *f)
                .unwrap_or_default();
            let expr = Expr::Column(
                ColumnExpr::resolve(Span::default(), Arc::clone(source_type), vec![name.clone()])
                    .expect("gathered from resolved columns"),
            );
            ProjExpr::make(Span::default(), name, flags, expr).expect("order flags are valid")
        })
        .collect()
}

/// Replace every column-to-constant atom with a column-to-argument
/// atom whose ordinal sits past the caller's window, collecting the
/// constants. Renumbering is stable: traversal order is left to right.
fn canonicalize_literals(
    filter: RowFilter,
    user_arg_count: usize,
    extra_args: &mut Vec<Value>,
) -> RowFilter {
    match filter {
        RowFilter::And(children) => RowFilter::And(
            children
                .into_iter()
                .map(|c| canonicalize_literals(c, user_arg_count, extra_args))
                .collect(),
        ),
        RowFilter::Or(children) => RowFilter::Or(
            children
                .into_iter()
                .map(|c| canonicalize_literals(c, user_arg_count, extra_args))
                .collect(),
        ),
        RowFilter::ColumnToConstant {
            column,
            op,
            constant,
        } => {
            let ordinal = user_arg_count + extra_args.len() + 1;
            extra_args.push(constant.value.clone());
            let mut param = ParamExpr::new(constant.span, ordinal);
            param.ty = constant.ty.clone();
            RowFilter::ColumnToArg { column, op, param }
        }
        leaf => leaf,
    }
}

/// The pushed layer, or the bare table when nothing pushes down.
fn make_unmapped(
    table: TableRef,
    source_type: &Arc<TupleType>,
    projection: Vec<ProjExpr>,
    filter: RowFilter,
) -> PlanResult<RelationExpr> {
    let base = RelationExpr::Table(TableExpr {
        table,
        row_type: Arc::clone(source_type),
    });
    let identity = filter.is_true()
        && projection.len() == source_type.len()
        && projection
            .iter()
            .zip(source_type.columns())
            .all(|(p, c)| p.flags.is_empty() && p.name == c.name);
    if identity {
        return Ok(base);
    }
    let names: Vec<&str> = projection.iter().map(|p| p.name.as_str()).collect();
    let row_type = Arc::new(source_type.project(&names)?);
    let cardinality = Cardinality::Many.filter(!filter.is_true());
    Ok(RelationExpr::Unmapped(UnmappedQueryExpr {
        from: Box::new(base),
        filter,
        projection,
        row_type,
        cardinality,
    }))
}

/// The mapper layer for plain (non-grouping) queries, elided when the
/// pushed layer already produces the target shape.
fn make_mapped(
    from: RelationExpr,
    projection: Vec<ProjExpr>,
    filter: Option<Expr>,
) -> PlanResult<RelationExpr> {
    let from_type = from.row_type();
    let derived = projection
        .iter()
        .any(|p| !matches!(&p.expr, Expr::Column(_)));
    let excluded = projection.iter().any(ProjExpr::is_excluded);
    let shape_matches = projection.len() == from_type.len()
        && projection
            .iter()
            .zip(from_type.columns())
            .all(|(p, c)| p.name == c.name);
    if filter.is_none() && !derived && !excluded && shape_matches {
        return Ok(from);
    }

    // Order-by over derived columns cannot push down; it becomes a
    // post-mapper sort over the mapped output.
    let sort: Vec<OrderTerm> = order_terms(&projection)
        .into_iter()
        .filter(|term| {
            projection
                .iter()
                .find(|p| p.name == term.column)
                .is_some_and(|p| !matches!(&p.expr, Expr::Column(_)))
        })
        .collect();
    let strip: Vec<String> = projection
        .iter()
        .filter(|p| p.is_excluded() && p.is_order_by())
        .map(|p| p.name.clone())
        .collect();

    let cardinality = from.cardinality().filter(filter.is_some());
    let row_type = target_type(&projection, &strip)?;
    Ok(RelationExpr::Mapped(MappedQueryExpr {
        from: Box::new(from),
        filter,
        projection,
        sort,
        strip,
        row_type,
        cardinality,
    }))
}

/// The aggregation layer. The leading plain-column projections
/// partition the input; every other projection and the remaining
/// filter are normalized with `as_aggregate`, so stray column accesses
/// become `first(column)` and the filter runs in the finish context.
fn make_aggregated(
    from: RelationExpr,
    projection: Vec<ProjExpr>,
    filter: Option<Expr>,
    finder: &dyn FunctionFinder,
) -> PlanResult<RelationExpr> {
    let group_by = projection
        .iter()
        .take_while(|p| matches!(&p.expr, Expr::Column(_)) && !p.expr.is_accumulating())
        .count();
    let group: HashSet<String> = projection[..group_by]
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let in_group = |name: &str| group.contains(name);

    let mut normalized = Vec::with_capacity(projection.len());
    for (i, proj) in projection.iter().enumerate() {
        let expr = if i < group_by {
            proj.expr.clone()
        } else {
            proj.expr.as_aggregate(&in_group, finder)?
        };
        normalized.push(ProjExpr::make(proj.span, proj.name.clone(), proj.flags, expr)?);
    }
    let filter = filter
        .map(|f| f.as_aggregate(&in_group, finder))
        .transpose()?;

    let strip: Vec<String> = normalized
        .iter()
        .filter(|p| p.is_excluded() && p.is_order_by())
        .map(|p| p.name.clone())
        .collect();
    // The layer itself emits every projection; carriers strip above.
    let row_type = target_type(&normalized, &[])?;
    let cardinality = Cardinality::Many;
    let root = RelationExpr::Aggregated(AggregatedQueryExpr {
        from: Box::new(from),
        group_by,
        projection: normalized,
        filter,
        row_type,
        cardinality,
    });
    Ok(post_process(root, strip))
}

/// The window layer. Projections are window-normalized; GROUPS and
/// RANGE frames require an ordered plain column upstream.
fn make_grouped(
    from: RelationExpr,
    projection: Vec<ProjExpr>,
    filter: Option<Expr>,
    finder: &dyn FunctionFinder,
) -> PlanResult<RelationExpr> {
    // A remaining row filter runs before any window sees the row.
    let from = match filter {
        Some(filter) => {
            let from_type = from.row_type();
            let identity: Vec<ProjExpr> = from_type
                .columns()
                .iter()
                .map(|col| {
                    let expr = Expr::Column(
                        ColumnExpr::resolve(
                            Span::default(),
                            Arc::clone(&from_type),
                            vec![col.name.clone()],
                        )
                        .expect("column of the from type"),
                    );
                    ProjExpr::make(Span::default(), col.name.clone(), ProjFlags::default(), expr)
                        .expect("plain projection")
                })
                .collect();
            let cardinality = from.cardinality().filter(true);
            RelationExpr::Mapped(MappedQueryExpr {
                from: Box::new(from),
                filter: Some(filter),
                projection: identity,
                sort: Vec::new(),
                strip: Vec::new(),
                row_type: Arc::clone(&from_type),
                cardinality,
            })
        }
        None => from,
    };

    let order_by = order_terms(&projection);
    let order_key = projection
        .iter()
        .find(|p| p.is_order_by() && matches!(&p.expr, Expr::Column(_)))
        .map(|p| {
            (
                p.expr.clone(),
                p.flags.contains(ProjFlags::DESCENDING),
            )
        });

    let mut assignments = WindowAssignments::new();
    let mut normalized = Vec::with_capacity(projection.len());
    for proj in &projection {
        let expr = proj.expr.as_window(&mut assignments, finder)?;
        normalized.push(ProjExpr::make(proj.span, proj.name.clone(), proj.flags, expr)?);
    }

    // RANGE/GROUPS frames are order-dependent; refuse when the query
    // establishes no ordering to compute against.
    let order_dependent = normalized.iter().any(|p| {
        let mut dependent = false;
        p.expr.visit(&mut |e| {
            if let Expr::Call(c) = e {
                if let Some(spec) = c.applier.window() {
                    if matches!(
                        spec.frame.mode,
                        relq_expr::FrameMode::Groups | relq_expr::FrameMode::Range
                    ) {
                        dependent = true;
                    }
                }
            }
        });
        dependent
    });
    if order_dependent && order_key.is_none() {
        return Err(PlanError::UnorderedWindow(
            "add an ordered (+ or -) column to the projection".into(),
        ));
    }

    let strip: Vec<String> = normalized
        .iter()
        .filter(|p| p.is_excluded() && p.is_order_by())
        .map(|p| p.name.clone())
        .collect();
    // The layer itself emits every projection; carriers strip above.
    let row_type = target_type(&normalized, &[])?;
    let cardinality = from.cardinality();
    let root = RelationExpr::Grouped(GroupedQueryExpr {
        from: Box::new(from),
        group_by: 0,
        order_by,
        projection: normalized,
        order_key,
        row_type,
        cardinality,
    });
    Ok(post_process(root, strip))
}

/// Wrap a grouping layer with a final identity mapper when excluded
/// order-by columns must be stripped from the visible result.
fn post_process(root: RelationExpr, strip: Vec<String>) -> RelationExpr {
    if strip.is_empty() {
        return root;
    }
    let inner_type = root.row_type();
    let projection: Vec<ProjExpr> = inner_type
        .columns()
        .iter()
        .map(|col| {
            let expr = Expr::Column(
                ColumnExpr::resolve(
                    Span::default(),
                    Arc::clone(&inner_type),
                    vec![col.name.clone()],
                )
                .expect("column of the result type"),
            );
            ProjExpr::make(Span::default(), col.name.clone(), ProjFlags::default(), expr)
                .expect("plain projection")
        })
        .collect();
    let visible: Vec<Column> = inner_type
        .columns()
        .iter()
        .filter(|c| !strip.contains(&c.name))
        .cloned()
        .collect();
    let row_type = Arc::new(TupleType::new(visible).expect("names already unique"));
    let cardinality = root.cardinality();
    RelationExpr::Mapped(MappedQueryExpr {
        from: Box::new(root),
        filter: None,
        projection,
        sort: Vec::new(),
        strip,
        row_type,
        cardinality,
    })
}

/// The visible output type: one column per projection, minus the
/// stripped carriers.
fn target_type(projection: &[ProjExpr], strip: &[String]) -> PlanResult<Arc<TupleType>> {
    let columns: Vec<Column> = projection
        .iter()
        .filter(|p| !strip.contains(&p.name))
        .map(|p| Column::new(p.name.clone(), p.expr.ty()))
        .collect();
    Ok(Arc::new(TupleType::new(columns).map_err(
        relq_store::StoreError::from,
    )?))
}
