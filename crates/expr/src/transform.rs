// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Expression transforms
//!
//! Expressions are immutable; the transforms here rebuild trees:
//!
//! - [`Expr::as_type`] — identity or a wrapping conversion
//! - [`Expr::not`] / [`Expr::negate`] — boolean and arithmetic negation
//!   rewrites
//! - [`Expr::replace`] — structural substitution
//! - [`Expr::as_aggregate`] — normalize a projection for a grouped
//!   aggregation
//! - [`Expr::as_window`] — normalize a projection for window evaluation

use std::collections::HashMap;

use relq_types::{Type, Value};

use crate::apply::{ApplierKind, FunctionFinder};
use crate::error::{ExprError, ExprResult};
use crate::expr::{
    AssignExpr, BinaryExpr, BinaryOp, CallExpr, ColumnExpr, ConstantExpr, ConversionExpr, Expr,
    InExpr, NotExpr, RangeExpr, VarExpr,
};
use crate::span::Span;

impl Expr {
    /// This expression at the target type: identity when the type
    /// already matches, a checked conversion otherwise. Statically
    /// incompatible lanes fail here.
    pub fn as_type(self, target: &Type) -> ExprResult<Expr> {
        if &self.ty() == target || matches!(target, Type::Any) {
            return Ok(self);
        }
        if let Expr::Constant(c) = &self {
            // Fold the conversion when the constant converts cleanly;
            // otherwise keep the runtime conversion (a nullable literal
            // may be fine at runtime).
            if let Ok(value) = c.value.convert(target) {
                return Ok(Expr::Constant(ConstantExpr::typed(
                    c.span,
                    value,
                    target.clone(),
                )));
            }
        }
        let convertible = match (self.ty(), target) {
            (Type::Any, _) | (_, Type::Any) => true,
            (from, to) => from
                .common_type(to, relq_types::OpCategory::Comparison)
                .is_some(),
        };
        if !convertible {
            return Err(ExprError::TypeMismatch {
                message: format!("cannot convert {} to {target}", self.ty()),
                span: self.span(),
            });
        }
        Ok(Expr::Conversion(Box::new(ConversionExpr {
            span: self.span(),
            expr: self,
            ty: target.clone(),
        })))
    }

    /// Logical negation with rewriting: double negation cancels,
    /// comparisons invert their operator, and conjunctions De Morgan
    /// (which preserves short-circuit evaluation order).
    pub fn not(self) -> Expr {
        let span = self.span();
        match self {
            Expr::Constant(c) => match c.value {
                Value::Boolean(b) => ConstantExpr::bool_expr(c.span, !b),
                _ => wrap_not(span, Expr::Constant(c)),
            },
            Expr::Not(inner) => inner.expr,
            Expr::Binary(b) => {
                if let Some(negated) = b.op.negate_comparison() {
                    Expr::Binary(Box::new(BinaryExpr {
                        span: b.span,
                        op: negated,
                        left: b.left,
                        right: b.right,
                        ty: b.ty,
                    }))
                } else if b.op == BinaryOp::And || b.op == BinaryOp::Or {
                    let op = if b.op == BinaryOp::And {
                        BinaryOp::Or
                    } else {
                        BinaryOp::And
                    };
                    Expr::Binary(Box::new(BinaryExpr {
                        span: b.span,
                        op,
                        left: b.left.not(),
                        right: b.right.not(),
                        ty: b.ty,
                    }))
                } else {
                    wrap_not(span, Expr::Binary(b))
                }
            }
            other => wrap_not(span, other),
        }
    }

    /// Arithmetic negation where it is cheap: constants negate in
    /// place, widening on lane overflow when allowed. Returns `None`
    /// when the caller should fall back to `0 - expr`.
    pub fn negate(&self, widen: bool) -> Option<Expr> {
        match self {
            Expr::Constant(c) => {
                let value = relq_types::value::negate(&c.value, widen)?;
                let ty = value.ty();
                Some(Expr::Constant(ConstantExpr::typed(c.span, value, ty)))
            }
            _ => None,
        }
    }

    /// Structural substitution: any subtree equal to a map key is
    /// replaced by the mapped expression. Replacement does not recurse
    /// into replaced subtrees.
    pub fn replace(&self, map: &HashMap<Expr, Expr>) -> Expr {
        if let Some(to) = map.get(self) {
            return to.clone();
        }
        match self {
            Expr::Constant(_) | Expr::Param(_) | Expr::Column(_) | Expr::Var(_) => self.clone(),
            Expr::Assign(e) => Expr::Assign(Box::new(AssignExpr {
                span: e.span,
                name: e.name.clone(),
                expr: e.expr.replace(map),
            })),
            Expr::Conversion(e) => Expr::Conversion(Box::new(ConversionExpr {
                span: e.span,
                expr: e.expr.replace(map),
                ty: e.ty.clone(),
            })),
            Expr::Not(e) => Expr::Not(Box::new(NotExpr {
                span: e.span,
                expr: e.expr.replace(map),
            })),
            Expr::Binary(e) => Expr::Binary(Box::new(BinaryExpr {
                span: e.span,
                op: e.op,
                left: e.left.replace(map),
                right: e.right.replace(map),
                ty: e.ty.clone(),
            })),
            Expr::In(e) => Expr::In(Box::new(InExpr {
                span: e.span,
                value: e.value.replace(map),
                range: e.range.replace(map),
                ty: e.ty.clone(),
            })),
            Expr::Range(e) => Expr::Range(Box::new(RangeExpr {
                span: e.span,
                start: e.start.as_ref().map(|s| s.replace(map)),
                end: e.end.as_ref().map(|s| s.replace(map)),
                ty: e.ty.clone(),
            })),
            Expr::Call(e) => Expr::Call(Box::new(CallExpr {
                span: e.span,
                name: e.name.clone(),
                args: e.args.iter().map(|a| a.replace(map)).collect(),
                named_args: e
                    .named_args
                    .iter()
                    .map(|(n, a)| (n.clone(), a.replace(map)))
                    .collect(),
                applier: e.applier.clone(),
            })),
        }
    }

    /// Normalize a projection expression for grouped aggregation: a
    /// column in the group partition stays (it is constant within a
    /// group), any other direct column access wraps in the `first`
    /// aggregate, and subtrees already under an aggregate stay as
    /// per-row inputs.
    pub fn as_aggregate(
        &self,
        group: &dyn Fn(&str) -> bool,
        finder: &dyn FunctionFinder,
    ) -> ExprResult<Expr> {
        match self {
            Expr::Column(c) => {
                if c.is_wildcard() {
                    return Err(ExprError::AggregationMisuse {
                        message: "wildcard cannot appear in an aggregated projection".into(),
                        span: c.span,
                    });
                }
                match c.base_name() {
                    Some(base) if group(base) => Ok(self.clone()),
                    _ => CallExpr::make(
                        c.span,
                        "first".into(),
                        vec![self.clone()],
                        Vec::new(),
                        finder,
                    ),
                }
            }
            Expr::Call(c) if c.applier.kind() == ApplierKind::Aggregated => Ok(self.clone()),
            Expr::Call(c) if c.applier.kind() == ApplierKind::Grouped => {
                Err(ExprError::AggregationMisuse {
                    message: format!("window function {} cannot appear in an aggregation", c.name),
                    span: c.span,
                })
            }
            Expr::Constant(_) | Expr::Param(_) | Expr::Var(_) => Ok(self.clone()),
            Expr::Assign(e) => Ok(Expr::Assign(Box::new(AssignExpr {
                span: e.span,
                name: e.name.clone(),
                expr: e.expr.as_aggregate(group, finder)?,
            }))),
            Expr::Conversion(e) => Ok(Expr::Conversion(Box::new(ConversionExpr {
                span: e.span,
                expr: e.expr.as_aggregate(group, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::Not(e) => Ok(Expr::Not(Box::new(NotExpr {
                span: e.span,
                expr: e.expr.as_aggregate(group, finder)?,
            }))),
            Expr::Binary(e) => Ok(Expr::Binary(Box::new(BinaryExpr {
                span: e.span,
                op: e.op,
                left: e.left.as_aggregate(group, finder)?,
                right: e.right.as_aggregate(group, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::In(e) => Ok(Expr::In(Box::new(InExpr {
                span: e.span,
                value: e.value.as_aggregate(group, finder)?,
                range: e.range.as_aggregate(group, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::Range(e) => Ok(Expr::Range(Box::new(RangeExpr {
                span: e.span,
                start: e.start.as_ref().map(|s| s.as_aggregate(group, finder)).transpose()?,
                end: e.end.as_ref().map(|s| s.as_aggregate(group, finder)).transpose()?,
                ty: e.ty.clone(),
            }))),
            Expr::Call(e) => Ok(Expr::Call(Box::new(CallExpr {
                span: e.span,
                name: e.name.clone(),
                args: e
                    .args
                    .iter()
                    .map(|a| a.as_aggregate(group, finder))
                    .collect::<ExprResult<_>>()?,
                named_args: e
                    .named_args
                    .iter()
                    .map(|(n, a)| Ok((n.clone(), a.as_aggregate(group, finder)?)))
                    .collect::<ExprResult<_>>()?,
                applier: e.applier.clone(),
            }))),
        }
    }

    /// Normalize a projection expression for window evaluation: every
    /// direct column access becomes `first(column, rows: 0..0)`, bound
    /// to a local so repeated accesses share one window slot. Window
    /// calls keep their raw arguments; an unframed aggregate has no
    /// meaning here.
    pub fn as_window(
        &self,
        assignments: &mut WindowAssignments,
        finder: &dyn FunctionFinder,
    ) -> ExprResult<Expr> {
        match self {
            Expr::Column(c) => {
                if c.is_wildcard() {
                    return Err(ExprError::AggregationMisuse {
                        message: "wildcard cannot appear in a windowed projection".into(),
                        span: c.span,
                    });
                }
                assignments.bind(c, finder)
            }
            Expr::Call(c) if c.applier.kind() == ApplierKind::Grouped => Ok(self.clone()),
            Expr::Call(c) if c.applier.kind() == ApplierKind::Aggregated => {
                Err(ExprError::AggregationMisuse {
                    message: format!(
                        "{} requires a rows, groups or range frame in a windowed projection",
                        c.name
                    ),
                    span: c.span,
                })
            }
            Expr::Constant(_) | Expr::Param(_) | Expr::Var(_) => Ok(self.clone()),
            Expr::Assign(e) => Ok(Expr::Assign(Box::new(AssignExpr {
                span: e.span,
                name: e.name.clone(),
                expr: e.expr.as_window(assignments, finder)?,
            }))),
            Expr::Conversion(e) => Ok(Expr::Conversion(Box::new(ConversionExpr {
                span: e.span,
                expr: e.expr.as_window(assignments, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::Not(e) => Ok(Expr::Not(Box::new(NotExpr {
                span: e.span,
                expr: e.expr.as_window(assignments, finder)?,
            }))),
            Expr::Binary(e) => Ok(Expr::Binary(Box::new(BinaryExpr {
                span: e.span,
                op: e.op,
                left: e.left.as_window(assignments, finder)?,
                right: e.right.as_window(assignments, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::In(e) => Ok(Expr::In(Box::new(InExpr {
                span: e.span,
                value: e.value.as_window(assignments, finder)?,
                range: e.range.as_window(assignments, finder)?,
                ty: e.ty.clone(),
            }))),
            Expr::Range(e) => Ok(Expr::Range(Box::new(RangeExpr {
                span: e.span,
                start: e
                    .start
                    .as_ref()
                    .map(|s| s.as_window(assignments, finder))
                    .transpose()?,
                end: e
                    .end
                    .as_ref()
                    .map(|s| s.as_window(assignments, finder))
                    .transpose()?,
                ty: e.ty.clone(),
            }))),
            Expr::Call(e) => Ok(Expr::Call(Box::new(CallExpr {
                span: e.span,
                name: e.name.clone(),
                args: e
                    .args
                    .iter()
                    .map(|a| a.as_window(assignments, finder))
                    .collect::<ExprResult<_>>()?,
                named_args: e
                    .named_args
                    .iter()
                    .map(|(n, a)| Ok((n.clone(), a.as_window(assignments, finder)?)))
                    .collect::<ExprResult<_>>()?,
                applier: e.applier.clone(),
            }))),
        }
    }
}

fn wrap_not(span: Span, expr: Expr) -> Expr {
    Expr::Not(Box::new(NotExpr { span, expr }))
}

/// Deduplicated column bindings created by [`Expr::as_window`].
///
/// The first access of a column materializes an assignment of
/// `first(column, rows: 0..0)`; later accesses of the same column become
/// plain variable references sharing that slot.
#[derive(Default)]
pub struct WindowAssignments {
    bound: HashMap<String, String>,
    counter: usize,
}

impl WindowAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, column: &ColumnExpr, finder: &dyn FunctionFinder) -> ExprResult<Expr> {
        let key = column.printed_name();
        if let Some(var) = self.bound.get(&key) {
            return Ok(Expr::Var(VarExpr {
                span: column.span,
                name: var.clone(),
                ty: column.ty(),
            }));
        }
        let name = format!("#w{}", self.counter);
        self.counter += 1;
        self.bound.insert(key, name.clone());

        let zero = |span| Expr::Constant(ConstantExpr::new(span, Value::Long(0)));
        let frame = RangeExpr::make(column.span, Some(zero(column.span)), Some(zero(column.span)))?;
        let call = CallExpr::make(
            column.span,
            "first".into(),
            vec![Expr::Column(column.clone())],
            vec![("rows".into(), frame)],
            finder,
        )?;
        Ok(Expr::Assign(Box::new(AssignExpr {
            span: column.span,
            name,
            expr: call,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_types::Primitive;

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    #[test]
    fn test_as_type_identity() {
        let c = constant(Value::Int(5));
        let same = c.clone().as_type(&Type::basic(Primitive::Int)).unwrap();
        assert_eq!(same, c);
    }

    #[test]
    fn test_as_type_constant_folds() {
        let c = constant(Value::Int(5));
        let widened = c.as_type(&Type::basic(Primitive::Long)).unwrap();
        assert_eq!(widened, constant(Value::Long(5)));
    }

    #[test]
    fn test_as_type_incompatible() {
        let c = constant(Value::Text("x".into()));
        assert!(c.as_type(&Type::basic(Primitive::Int)).is_err());
    }

    #[test]
    fn test_not_rewrites() {
        assert!(constant(Value::Boolean(true)).not().is_const_false());

        let cmp = BinaryExpr::make(
            Span::default(),
            BinaryOp::Lt,
            Expr::Param(crate::expr::ParamExpr::new(Span::default(), 1)),
            constant(Value::Int(0)),
        )
        .unwrap();
        let negated = cmp.not();
        assert!(matches!(&negated, Expr::Binary(b) if b.op == BinaryOp::Ge));
        // Double negation cancels back to the comparison flip.
        assert!(matches!(&negated.not(), Expr::Binary(b) if b.op == BinaryOp::Lt));
    }

    #[test]
    fn test_negate_constant() {
        let c = constant(Value::Int(5));
        assert_eq!(c.negate(false).unwrap(), constant(Value::Int(-5)));
        let min = constant(Value::Int(i32::MIN));
        assert!(min.negate(false).is_none());
        assert_eq!(
            min.negate(true).unwrap(),
            constant(Value::Long(-(i32::MIN as i64)))
        );
    }

    #[test]
    fn test_replace() {
        let from = constant(Value::Int(1));
        let to = constant(Value::Int(2));
        let tree = BinaryExpr::make(
            Span::default(),
            BinaryOp::Add,
            from.clone(),
            Expr::Param(crate::expr::ParamExpr::new(Span::default(), 1)),
        )
        .unwrap();
        let mut map = HashMap::new();
        map.insert(from, to.clone());
        let replaced = tree.replace(&map);
        assert!(matches!(&replaced, Expr::Binary(b) if b.left == to));
    }
}
