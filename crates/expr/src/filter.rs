// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Row filters
//!
//! A [`RowFilter`] is the boolean predicate form the planner splits
//! between the storage engine and the mapper layer. Leaves are
//! column-to-argument, column-to-column and column-to-constant atoms —
//! the shapes storage can execute natively — plus opaque expression
//! atoms, which never push down.
//!
//! The bridge is two-way: [`Expr::to_row_filter`] lowers an expression,
//! and [`RowFilter::to_expr`] reconstructs one after splitting.

use std::collections::HashMap;
use std::fmt;

use relq_types::Type;

use crate::expr::{BinaryExpr, BinaryOp, ColumnExpr, ConstantExpr, Expr, ParamExpr};
use crate::span::Span;

/// Comparison operators appearing in filter atoms
pub type CompareOp = BinaryOp;

/// A boolean predicate tree over filterable atoms
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowFilter {
    /// Accepts every row
    True,
    /// Rejects every row
    False,
    And(Vec<RowFilter>),
    Or(Vec<RowFilter>),
    /// `column op ?arg`
    ColumnToArg {
        column: ColumnExpr,
        op: CompareOp,
        param: ParamExpr,
    },
    /// `column op constant`
    ColumnToConstant {
        column: ColumnExpr,
        op: CompareOp,
        constant: ConstantExpr,
    },
    /// `column op column`
    ColumnToColumn {
        left: ColumnExpr,
        op: CompareOp,
        right: ColumnExpr,
    },
    /// Anything storage cannot evaluate; never pushable
    Opaque(Expr),
}

impl RowFilter {
    pub fn is_true(&self) -> bool {
        matches!(self, RowFilter::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, RowFilter::False)
    }

    /// Conjunction with flattening and trivial folding.
    pub fn and(self, other: RowFilter) -> RowFilter {
        match (self, other) {
            (RowFilter::True, f) | (f, RowFilter::True) => f,
            (RowFilter::False, _) | (_, RowFilter::False) => RowFilter::False,
            (RowFilter::And(mut a), RowFilter::And(b)) => {
                a.extend(b);
                RowFilter::And(a)
            }
            (RowFilter::And(mut a), f) => {
                a.push(f);
                RowFilter::And(a)
            }
            (f, RowFilter::And(mut b)) => {
                b.insert(0, f);
                RowFilter::And(b)
            }
            (a, b) => RowFilter::And(vec![a, b]),
        }
    }

    /// Disjunction with flattening and trivial folding.
    pub fn or(self, other: RowFilter) -> RowFilter {
        match (self, other) {
            (RowFilter::False, f) | (f, RowFilter::False) => f,
            (RowFilter::True, _) | (_, RowFilter::True) => RowFilter::True,
            (RowFilter::Or(mut a), RowFilter::Or(b)) => {
                a.extend(b);
                RowFilter::Or(a)
            }
            (RowFilter::Or(mut a), f) => {
                a.push(f);
                RowFilter::Or(a)
            }
            (f, RowFilter::Or(mut b)) => {
                b.insert(0, f);
                RowFilter::Or(b)
            }
            (a, b) => RowFilter::Or(vec![a, b]),
        }
    }

    /// Logical negation. Atoms invert their comparison; branches apply
    /// De Morgan; opaque atoms wrap their expression.
    pub fn not(self) -> RowFilter {
        match self {
            RowFilter::True => RowFilter::False,
            RowFilter::False => RowFilter::True,
            RowFilter::And(children) => {
                RowFilter::Or(children.into_iter().map(RowFilter::not).collect())
            }
            RowFilter::Or(children) => {
                RowFilter::And(children.into_iter().map(RowFilter::not).collect())
            }
            RowFilter::ColumnToArg { column, op, param } => RowFilter::ColumnToArg {
                column,
                op: op.negate_comparison().expect("comparison atom"),
                param,
            },
            RowFilter::ColumnToConstant {
                column,
                op,
                constant,
            } => RowFilter::ColumnToConstant {
                column,
                op: op.negate_comparison().expect("comparison atom"),
                constant,
            },
            RowFilter::ColumnToColumn { left, op, right } => RowFilter::ColumnToColumn {
                left,
                op: op.negate_comparison().expect("comparison atom"),
                right,
            },
            RowFilter::Opaque(e) => RowFilter::Opaque(e.not()),
        }
    }

    /// Conjunctive normal form: a conjunction of disjunctions of atoms.
    ///
    /// Distribution duplicates subtrees. When a duplicate would contain
    /// a non-pure expression, the rewrite is unsafe (the function would
    /// run more than once), so the original filter is returned instead.
    pub fn cnf(&self) -> RowFilter {
        let normalized = self.cnf_unchecked();
        let mut before = HashMap::new();
        self.count_impure(&mut before);
        if before.is_empty() {
            return normalized;
        }
        let mut after = HashMap::new();
        normalized.count_impure(&mut after);
        let duplicated = after.iter().any(|(expr, n)| before.get(expr) < Some(n));
        if duplicated {
            self.clone()
        } else {
            normalized
        }
    }

    fn cnf_unchecked(&self) -> RowFilter {
        match self {
            RowFilter::And(children) => children
                .iter()
                .map(RowFilter::cnf_unchecked)
                .fold(RowFilter::True, RowFilter::and),
            RowFilter::Or(children) => {
                let mut result = RowFilter::False;
                for child in children {
                    result = distribute_or(result, child.cnf_unchecked());
                }
                result
            }
            leaf => leaf.clone(),
        }
    }

    fn count_impure(&self, counts: &mut HashMap<Expr, usize>) {
        match self {
            RowFilter::And(children) | RowFilter::Or(children) => {
                for c in children {
                    c.count_impure(counts);
                }
            }
            RowFilter::Opaque(e) if !e.is_pure() => {
                *counts.entry(e.clone()).or_insert(0) += 1;
            }
            _ => {}
        }
    }

    /// Split this filter into `[pushable, remainder]` against the set
    /// of columns the storage source can filter natively. Works
    /// conjunct by conjunct: a conjunct pushes only when every atom in
    /// it is available and none is opaque. The conjunction of the two
    /// halves is equivalent to the original filter.
    pub fn split(&self, available: &dyn Fn(&str) -> bool) -> [RowFilter; 2] {
        let conjuncts: Vec<&RowFilter> = match self {
            RowFilter::And(children) => children.iter().collect(),
            other => vec![other],
        };
        let mut pushable = RowFilter::True;
        let mut remainder = RowFilter::True;
        for conjunct in conjuncts {
            if conjunct.is_pushable(available) {
                pushable = pushable.and(conjunct.clone());
            } else {
                remainder = remainder.and(conjunct.clone());
            }
        }
        [pushable, remainder]
    }

    fn is_pushable(&self, available: &dyn Fn(&str) -> bool) -> bool {
        let col_ok = |c: &ColumnExpr| c.base_name().is_some_and(available);
        match self {
            RowFilter::True | RowFilter::False => true,
            RowFilter::And(children) | RowFilter::Or(children) => {
                children.iter().all(|c| c.is_pushable(available))
            }
            RowFilter::ColumnToArg { column, .. } | RowFilter::ColumnToConstant { column, .. } => {
                col_ok(column)
            }
            RowFilter::ColumnToColumn { left, right, .. } => col_ok(left) && col_ok(right),
            RowFilter::Opaque(_) => false,
        }
    }

    /// Collect the column expressions of every atom.
    pub fn gather_columns(&self, consumer: &mut dyn FnMut(&ColumnExpr)) {
        match self {
            RowFilter::True | RowFilter::False => {}
            RowFilter::And(children) | RowFilter::Or(children) => {
                for c in children {
                    c.gather_columns(consumer);
                }
            }
            RowFilter::ColumnToArg { column, .. } | RowFilter::ColumnToConstant { column, .. } => {
                consumer(column);
            }
            RowFilter::ColumnToColumn { left, right, .. } => {
                consumer(left);
                consumer(right);
            }
            RowFilter::Opaque(e) => e.gather_eval_columns(consumer),
        }
    }

    /// Highest parameter ordinal referenced by any atom.
    pub fn max_argument(&self) -> usize {
        match self {
            RowFilter::True | RowFilter::False => 0,
            RowFilter::And(children) | RowFilter::Or(children) => children
                .iter()
                .map(RowFilter::max_argument)
                .max()
                .unwrap_or(0),
            RowFilter::ColumnToArg { param, .. } => param.ordinal,
            RowFilter::ColumnToConstant { .. } | RowFilter::ColumnToColumn { .. } => 0,
            RowFilter::Opaque(e) => e.max_argument(),
        }
    }

    /// Rebuild the expression form of this filter.
    pub fn to_expr(&self, span: Span) -> Expr {
        match self {
            RowFilter::True => ConstantExpr::bool_expr(span, true),
            RowFilter::False => ConstantExpr::bool_expr(span, false),
            RowFilter::And(children) => children
                .iter()
                .map(|c| c.to_expr(span))
                .reduce(|a, b| rebuild(BinaryOp::And, a, b))
                .unwrap_or_else(|| ConstantExpr::bool_expr(span, true)),
            RowFilter::Or(children) => children
                .iter()
                .map(|c| c.to_expr(span))
                .reduce(|a, b| rebuild(BinaryOp::Or, a, b))
                .unwrap_or_else(|| ConstantExpr::bool_expr(span, false)),
            RowFilter::ColumnToArg { column, op, param } => rebuild(
                *op,
                Expr::Column(column.clone()),
                Expr::Param(param.clone()),
            ),
            RowFilter::ColumnToConstant {
                column,
                op,
                constant,
            } => rebuild(
                *op,
                Expr::Column(column.clone()),
                Expr::Constant(constant.clone()),
            ),
            RowFilter::ColumnToColumn { left, op, right } => rebuild(
                *op,
                Expr::Column(left.clone()),
                Expr::Column(right.clone()),
            ),
            RowFilter::Opaque(e) => e.clone(),
        }
    }
}

fn rebuild(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let ty = if op.is_comparison() && !(left.is_nullable() || right.is_nullable()) {
        Type::BOOLEAN
    } else if op.is_comparison() {
        Type::BOOLEAN.nullable()
    } else {
        left.ty()
    };
    let span = left.span().cover(right.span());
    Expr::Binary(Box::new(BinaryExpr {
        span,
        op,
        left,
        right,
        ty,
    }))
}

fn distribute_or(a: RowFilter, b: RowFilter) -> RowFilter {
    match (a, b) {
        (RowFilter::And(children), other) | (other, RowFilter::And(children)) => children
            .into_iter()
            .map(|c| distribute_or(c, other.clone()))
            .fold(RowFilter::True, RowFilter::and),
        (a, b) => a.or(b),
    }
}

impl Expr {
    /// Lower this boolean expression to a row filter, reporting the
    /// column each atom reads through `columns`. Anything that is not a
    /// native comparison shape becomes an opaque atom.
    pub fn to_row_filter(&self, columns: &mut Vec<ColumnExpr>) -> RowFilter {
        self.to_row_filter_inner(columns)
    }

    fn to_row_filter_inner(&self, columns: &mut Vec<ColumnExpr>) -> RowFilter {
        match self {
            Expr::Constant(c) => {
                if self.is_const_true() {
                    RowFilter::True
                } else if self.is_const_false() {
                    RowFilter::False
                } else {
                    RowFilter::Opaque(Expr::Constant(c.clone()))
                }
            }
            Expr::Not(n) => n.expr.to_row_filter_inner(columns).not(),
            // A bare boolean column is the atom `column == true`.
            Expr::Column(c) if self.ty().is_boolean() && !c.is_wildcard() => {
                columns.push(c.clone());
                RowFilter::ColumnToConstant {
                    column: c.clone(),
                    op: BinaryOp::Eq,
                    constant: ConstantExpr::new(c.span, relq_types::Value::Boolean(true)),
                }
            }
            Expr::Binary(b) => match b.op {
                BinaryOp::And | BinaryOp::BitAnd => {
                    let left = b.left.to_row_filter_inner(columns);
                    let right = b.right.to_row_filter_inner(columns);
                    left.and(right)
                }
                BinaryOp::Or | BinaryOp::BitOr => {
                    let left = b.left.to_row_filter_inner(columns);
                    let right = b.right.to_row_filter_inner(columns);
                    left.or(right)
                }
                op if op.is_comparison() => comparison_atom(b, op, columns),
                _ => RowFilter::Opaque(self.clone()),
            },
            other => RowFilter::Opaque(other.clone()),
        }
    }
}

/// Classify a comparison into an atom shape, unwrapping conversions the
/// planner inserted around the operands.
fn comparison_atom(b: &BinaryExpr, op: BinaryOp, columns: &mut Vec<ColumnExpr>) -> RowFilter {
    let left = peel(&b.left);
    let right = peel(&b.right);
    match (left, right) {
        (Expr::Column(c), Expr::Param(p)) => {
            columns.push(c.clone());
            RowFilter::ColumnToArg {
                column: c.clone(),
                op,
                param: p.clone(),
            }
        }
        (Expr::Param(p), Expr::Column(c)) => {
            columns.push(c.clone());
            RowFilter::ColumnToArg {
                column: c.clone(),
                op: op.flip(),
                param: p.clone(),
            }
        }
        (Expr::Column(c), Expr::Constant(k)) => {
            columns.push(c.clone());
            RowFilter::ColumnToConstant {
                column: c.clone(),
                op,
                constant: k.clone(),
            }
        }
        (Expr::Constant(k), Expr::Column(c)) => {
            columns.push(c.clone());
            RowFilter::ColumnToConstant {
                column: c.clone(),
                op: op.flip(),
                constant: k.clone(),
            }
        }
        (Expr::Column(l), Expr::Column(r)) => {
            columns.push(l.clone());
            columns.push(r.clone());
            RowFilter::ColumnToColumn {
                left: l.clone(),
                op,
                right: r.clone(),
            }
        }
        _ => RowFilter::Opaque(Expr::Binary(Box::new(b.clone()))),
    }
}

/// Strip conversions for atom classification; the conversion is
/// reapplied by storage through the common type of the comparison.
fn peel(expr: &Expr) -> &Expr {
    match expr {
        Expr::Conversion(c) => peel(&c.expr),
        other => other,
    }
}

// Rendered in the storage view-string contract: `{proj} col op ?n`.
impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, false)
    }
}

impl RowFilter {
    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, inside_and: bool) -> fmt::Result {
        match self {
            RowFilter::True => f.write_str("true"),
            RowFilter::False => f.write_str("false"),
            RowFilter::And(children) => {
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    c.fmt_prec(f, true)?;
                }
                Ok(())
            }
            RowFilter::Or(children) => {
                if inside_and {
                    f.write_str("(")?;
                }
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    c.fmt_prec(f, false)?;
                }
                if inside_and {
                    f.write_str(")")?;
                }
                Ok(())
            }
            RowFilter::ColumnToArg { column, op, param } => {
                write!(f, "{} {} ?{}", column.printed_name(), op.symbol(), param.ordinal)
            }
            RowFilter::ColumnToConstant {
                column,
                op,
                constant,
            } => write!(
                f,
                "{} {} {}",
                column.printed_name(),
                op.symbol(),
                constant.value
            ),
            RowFilter::ColumnToColumn { left, op, right } => write!(
                f,
                "{} {} {}",
                left.printed_name(),
                op.symbol(),
                right.printed_name()
            ),
            RowFilter::Opaque(e) => write!(f, "({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_types::{Column, Primitive, TupleType, Value};
    use std::sync::Arc;

    fn row_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("a", Type::basic(Primitive::Long)),
            Column::new("b", Type::basic(Primitive::Long)),
        ])
        .unwrap()
    }

    fn col(name: &str) -> Expr {
        Expr::Column(
            ColumnExpr::resolve(Span::default(), row_type(), vec![name.to_string()]).unwrap(),
        )
    }

    fn param(n: usize) -> Expr {
        Expr::Param(ParamExpr::new(Span::default(), n))
    }

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    fn cmp(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        BinaryExpr::make(Span::default(), op, l, r).unwrap()
    }

    #[test]
    fn test_atoms() {
        let mut cols = Vec::new();
        let f = cmp(BinaryOp::Gt, col("a"), param(1)).to_row_filter(&mut cols);
        assert!(matches!(f, RowFilter::ColumnToArg { .. }));
        assert_eq!(cols.len(), 1);
        assert_eq!(f.to_string(), "a > ?1");
    }

    #[test]
    fn test_flipped_atom() {
        let mut cols = Vec::new();
        let f = cmp(BinaryOp::Gt, param(1), col("a")).to_row_filter(&mut cols);
        assert_eq!(f.to_string(), "a < ?1");
    }

    #[test]
    fn test_split_by_availability() {
        let mut cols = Vec::new();
        let e = cmp(
            BinaryOp::And,
            cmp(BinaryOp::Gt, col("a"), param(1)),
            cmp(BinaryOp::Lt, col("b"), constant(Value::Long(10))),
        );
        let f = e.to_row_filter(&mut cols);
        let [push, rest] = f.split(&|name| name == "a");
        assert_eq!(push.to_string(), "a > ?1");
        assert_eq!(rest.to_string(), "b < 10L");
    }

    #[test]
    fn test_opaque_never_pushes() {
        let mut cols = Vec::new();
        let e = cmp(
            BinaryOp::Add,
            col("a"),
            constant(Value::Long(1)),
        );
        let e = cmp(BinaryOp::Gt, e, param(1));
        let f = e.to_row_filter(&mut cols);
        assert!(matches!(f, RowFilter::Opaque(_)));
        let [push, rest] = f.split(&|_| true);
        assert!(push.is_true());
        assert!(!rest.is_true());
    }

    #[test]
    fn test_cnf_distributes() {
        // (a == ?1 && b == ?2) || a == ?3  →  two conjuncts.
        let a1 = cmp(BinaryOp::Eq, col("a"), param(1));
        let b2 = cmp(BinaryOp::Eq, col("b"), param(2));
        let a3 = cmp(BinaryOp::Eq, col("a"), param(3));
        let e = cmp(BinaryOp::Or, cmp(BinaryOp::And, a1, b2), a3);
        let mut cols = Vec::new();
        let f = e.to_row_filter(&mut cols).cnf();
        match &f {
            RowFilter::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn test_not_negates_atoms() {
        let mut cols = Vec::new();
        let f = cmp(BinaryOp::Ge, col("a"), param(1)).to_row_filter(&mut cols);
        assert_eq!(f.not().to_string(), "a < ?1");
    }

    #[test]
    fn test_to_expr_round_trip() {
        let mut cols = Vec::new();
        let e = cmp(
            BinaryOp::And,
            cmp(BinaryOp::Gt, col("a"), param(1)),
            cmp(BinaryOp::Lt, col("b"), param(2)),
        );
        let f = e.to_row_filter(&mut cols);
        let back = f.to_expr(Span::default());
        let mut cols2 = Vec::new();
        assert_eq!(back.to_row_filter(&mut cols2), f);
    }
}
