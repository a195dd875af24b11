// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Binary expression construction
//!
//! [`BinaryExpr::make`] is where most expression rewriting happens. The
//! rewrites run in a fixed order:
//!
//! 1. Compute the common operand type; fail when none exists.
//! 2. Logical operators require boolean operands; eager `&`/`|` over
//!    pure operands lower to short-circuit `&&`/`||`.
//! 3. Boolean `==`/`!=`/`^` over pure, negatable operands expand into
//!    and/or form, which normalizes to conjunctions for filter
//!    splitting.
//! 4. Constant folding and algebraic identities.
//! 5. When the left operand can raise a runtime error and the right
//!    cannot, short-circuit operands swap so the fallible side runs
//!    last.
//! 6. What remains becomes a plain node.

use relq_types::{arith, OpCategory, Type, Value};

use crate::error::{ExprError, ExprResult};
use crate::expr::{BinaryExpr, BinaryOp, ConstantExpr, Expr};
use crate::span::Span;

impl BinaryExpr {
    /// Build a binary expression, applying the rewrite pipeline.
    pub fn make(span: Span, op: BinaryOp, left: Expr, right: Expr) -> ExprResult<Expr> {
        // 1. Common type.
        let category = if op.is_logical() {
            OpCategory::Logical
        } else if op.is_comparison() {
            OpCategory::Comparison
        } else {
            OpCategory::Arithmetic
        };
        let lty = left.ty();
        let rty = right.ty();
        let common = lty.common_type(&rty, category).ok_or_else(|| {
            let message = if op.is_logical() {
                format!("{} requires boolean operands, found {lty} and {rty}", op.symbol())
            } else {
                format!("no common type for {lty} {} {rty}", op.symbol())
            };
            ExprError::TypeMismatch { message, span }
        })?;
        let left = left.as_type(&common)?;
        let right = right.as_type(&common)?;

        // 2. Lower eager boolean operators to short-circuit form when
        // duplication-free reordering is allowed.
        let op = match op {
            BinaryOp::BitAnd if common.is_boolean() && left.is_pure() && right.is_pure() => {
                BinaryOp::And
            }
            BinaryOp::BitOr if common.is_boolean() && left.is_pure() && right.is_pure() => {
                BinaryOp::Or
            }
            other => other,
        };

        // 3. Boolean equality and xor expand into and/or form, which
        // the conjunctive normalizer can split.
        if common.is_boolean()
            && matches!(op, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Xor)
            && left.is_pure()
            && right.is_pure()
        {
            return expand_boolean(span, op, left, right);
        }

        // 4. Folding.
        if let Some(folded) = fold(span, op, &common, &left, &right)? {
            return Ok(folded);
        }

        // 5. Exception-minimizing operand order for short-circuit
        // operators: both orders observe the same result, so run the
        // side that cannot fail first.
        let (left, right) = if op.is_short_circuit()
            && left.is_pure()
            && right.is_pure()
            && left.can_throw()
            && !right.can_throw()
        {
            (right, left)
        } else {
            (left, right)
        };

        // 6. Plain node.
        let ty = node_type(op, &common, &left, &right);
        Ok(Expr::Binary(Box::new(BinaryExpr {
            span,
            op,
            left,
            right,
            ty,
        })))
    }
}

fn node_type(op: BinaryOp, common: &Type, left: &Expr, right: &Expr) -> Type {
    if op.is_comparison() {
        // Comparisons of nullable operands are three-valued.
        if left.is_nullable() || right.is_nullable() {
            Type::BOOLEAN.nullable()
        } else {
            Type::BOOLEAN
        }
    } else {
        common.clone()
    }
}

/// `a ^ b` becomes `(!a && b) || (a && !b)`; `a == b` becomes
/// `(a || !b) && (!a || b)`; `a != b` is xor.
fn expand_boolean(span: Span, op: BinaryOp, a: Expr, b: Expr) -> ExprResult<Expr> {
    let (not_a, not_b) = (a.clone().not(), b.clone().not());
    match op {
        BinaryOp::Eq => {
            let lhs = BinaryExpr::make(span, BinaryOp::Or, a.clone(), not_b)?;
            let rhs = BinaryExpr::make(span, BinaryOp::Or, not_a, b)?;
            BinaryExpr::make(span, BinaryOp::And, lhs, rhs)
        }
        BinaryOp::Ne | BinaryOp::Xor => {
            let lhs = BinaryExpr::make(span, BinaryOp::And, not_a, b.clone())?;
            let rhs = BinaryExpr::make(span, BinaryOp::And, a, not_b)?;
            BinaryExpr::make(span, BinaryOp::Or, lhs, rhs)
        }
        _ => unreachable!("expand_boolean only sees eq/ne/xor"),
    }
}

/// Constant folding and algebraic identities. Returns `None` when no
/// rewrite applies.
fn fold(
    span: Span,
    op: BinaryOp,
    common: &Type,
    left: &Expr,
    right: &Expr,
) -> ExprResult<Option<Expr>> {
    // Short-circuit logical identities.
    if op == BinaryOp::And {
        if left.is_const_true() {
            return Ok(Some(right.clone()));
        }
        if right.is_const_true() {
            return Ok(Some(left.clone()));
        }
        if left.is_const_false() {
            return Ok(Some(left.clone()));
        }
        // A false right operand cannot be hoisted over a non-pure or
        // throwing left.
        if right.is_const_false() && left.is_pure() && !left.can_throw() {
            return Ok(Some(right.clone()));
        }
        if left == right && left.is_pure() {
            return Ok(Some(left.clone()));
        }
    }
    if op == BinaryOp::Or {
        if left.is_const_false() {
            return Ok(Some(right.clone()));
        }
        if right.is_const_false() {
            return Ok(Some(left.clone()));
        }
        if left.is_const_true() {
            return Ok(Some(left.clone()));
        }
        if right.is_const_true() && left.is_pure() && !left.can_throw() {
            return Ok(Some(right.clone()));
        }
        if left == right && left.is_pure() {
            return Ok(Some(left.clone()));
        }
    }

    // Arithmetic identities. `x` must be pure where it is dropped or
    // returned unobserved.
    if op.is_arithmetic() && common.is_number() {
        if (op == BinaryOp::Add && right.is_zero())
            || (op == BinaryOp::Sub && right.is_zero())
            || (op == BinaryOp::Mul && right.is_one())
            || (op == BinaryOp::Div && right.is_one())
        {
            return Ok(Some(left.clone()));
        }
        if op == BinaryOp::Add && left.is_zero() {
            return Ok(Some(right.clone()));
        }
        if op == BinaryOp::Mul && left.is_one() {
            return Ok(Some(right.clone()));
        }
        if op == BinaryOp::Mul && (left.is_zero() || right.is_zero()) {
            let (zero, other) = if left.is_zero() {
                (left, right)
            } else {
                (right, left)
            };
            if other.is_pure() && !other.can_throw() && !common.is_nullable() {
                return Ok(Some(zero.clone()));
            }
        }
        if op == BinaryOp::Rem
            && right.is_one()
            && common.is_integer()
            && left.is_pure()
            && !left.can_throw()
        {
            if let Expr::Constant(c) = right {
                let zero = Value::Int(0)
                    .convert(&c.ty)
                    .unwrap_or(Value::Int(0));
                return Ok(Some(Expr::Constant(ConstantExpr::typed(
                    span,
                    zero,
                    common.clone(),
                ))));
            }
        }
    }

    // Constant-on-constant evaluation.
    if let (Expr::Constant(a), Expr::Constant(b)) = (left, right) {
        if op.is_comparison() {
            let result = match a.value.compare(&b.value) {
                Some(ord) => match op {
                    BinaryOp::Eq => ord.is_eq(),
                    BinaryOp::Ne => ord.is_ne(),
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    BinaryOp::Ge => ord.is_ge(),
                    _ => unreachable!(),
                },
                // Null comparisons and NaN stay unfolded; the runtime
                // decides.
                None => return Ok(None),
            };
            return Ok(Some(ConstantExpr::bool_expr(span, result)));
        }
        if op.is_arithmetic() {
            let arith_op = match op {
                BinaryOp::Add => arith::ArithOp::Add,
                BinaryOp::Sub => arith::ArithOp::Sub,
                BinaryOp::Mul => arith::ArithOp::Mul,
                BinaryOp::Div => arith::ArithOp::Div,
                BinaryOp::Rem => arith::ArithOp::Rem,
                _ => unreachable!(),
            };
            // A folding failure is the same error the runtime would
            // raise; report it at compile time with the node's span.
            return match arith::apply(arith_op, &a.value, &b.value) {
                Ok(value) => Ok(Some(Expr::Constant(ConstantExpr::typed(
                    span,
                    value,
                    common.clone(),
                )))),
                Err(e) => Err(ExprError::TypeMismatch {
                    message: e.to_string(),
                    span,
                }),
            };
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ParamExpr;

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    fn make(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        BinaryExpr::make(Span::default(), op, l, r).unwrap()
    }

    #[test]
    fn test_constant_fold_arithmetic() {
        let e = make(BinaryOp::Add, constant(Value::Int(2)), constant(Value::Int(3)));
        assert_eq!(e, constant(Value::Int(5)));
    }

    #[test]
    fn test_fold_identities() {
        let p = Expr::Param(ParamExpr::new(Span::default(), 1));
        let e = make(BinaryOp::Add, p.clone(), constant(Value::Int(0)));
        assert_eq!(e, p);
    }

    #[test]
    fn test_overflow_folds_to_error() {
        let err = BinaryExpr::make(
            Span::default(),
            BinaryOp::Mul,
            constant(Value::Byte(100)),
            constant(Value::Byte(2)),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn test_logical_requires_boolean() {
        let err = BinaryExpr::make(
            Span::default(),
            BinaryOp::And,
            constant(Value::Int(1)),
            constant(Value::Int(2)),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn test_eager_lowering() {
        let t = constant(Value::Boolean(true));
        let f = constant(Value::Boolean(false));
        // Eager & over pure operands folds through the short-circuit path.
        let e = make(BinaryOp::BitAnd, t, f.clone());
        assert_eq!(e, f);
    }

    #[test]
    fn test_boolean_eq_expands() {
        // Two pure non-constant boolean operands: a == a over params.
        let a = make(
            BinaryOp::Gt,
            Expr::Param(ParamExpr::new(Span::default(), 1)),
            constant(Value::Int(0)),
        );
        let b = make(
            BinaryOp::Gt,
            Expr::Param(ParamExpr::new(Span::default(), 2)),
            constant(Value::Int(0)),
        );
        let e = make(BinaryOp::Eq, a, b);
        // Expansion yields a conjunction at the top.
        assert!(matches!(
            &e,
            Expr::Binary(b) if b.op == BinaryOp::And
        ));
    }

    #[test]
    fn test_comparison_folds() {
        let e = make(BinaryOp::Lt, constant(Value::Int(1)), constant(Value::Int(2)));
        assert!(e.is_const_true());
    }

    #[test]
    fn test_common_type_mismatch() {
        let err = BinaryExpr::make(
            Span::default(),
            BinaryOp::Eq,
            constant(Value::Text("a".into())),
            constant(Value::Int(1)),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn test_mixed_lane_comparison_type() {
        let e = make(
            BinaryOp::Lt,
            constant(Value::Int(1)),
            Expr::Param(ParamExpr::new(Span::default(), 1)),
        );
        assert!(e.ty().is_boolean());
    }
}
