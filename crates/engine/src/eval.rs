// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Expression evaluation
//!
//! A tree-walking evaluator over [`Expr`]: the compiled operators are
//! interpreted rather than generated, so every operator shares this one
//! walker. Short-circuit operators evaluate lazily, plain function
//! calls pull their arguments through [`ArgSource`] on demand, and
//! comparisons over nullable operands are three-valued (a null operand
//! yields a null result, which filters treat as a non-match).
//!
//! Aggregated and grouped calls never reach the walker: the aggregation
//! and window engines rewrite them into variable references before any
//! row is evaluated.

use std::collections::HashMap;

use relq_types::{arith, EvalError, Primitive, RangeValue, Row, Value};

use relq_expr::{ApplierKind, ArgSource, BinaryOp, ColumnExpr, Expr};

/// Per-row evaluation state
pub struct EvalContext<'a> {
    pub row: &'a Row,
    pub args: &'a [Value],
    /// Local bindings introduced by assignments
    pub vars: HashMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(row: &'a Row, args: &'a [Value]) -> Self {
        Self {
            row,
            args,
            vars: HashMap::new(),
        }
    }
}

/// Evaluate an expression against the current row.
pub fn eval(expr: &Expr, cx: &mut EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant(c) => Ok(c.value.clone()),
        Expr::Param(p) => cx
            .args
            .get(p.ordinal - 1)
            .cloned()
            .ok_or_else(|| EvalError::Unsupported(format!("missing argument ?{}", p.ordinal))),
        Expr::Column(c) => eval_column(c, cx),
        Expr::Var(v) => cx
            .vars
            .get(&v.name)
            .cloned()
            .ok_or_else(|| EvalError::Unsupported(format!("unbound variable {}", v.name))),
        Expr::Assign(a) => {
            let value = eval(&a.expr, cx)?;
            cx.vars.insert(a.name.clone(), value.clone());
            Ok(value)
        }
        Expr::Conversion(c) => {
            let value = eval(&c.expr, cx)?;
            Ok(value.convert(&c.ty)?)
        }
        Expr::Not(n) => match eval(&n.expr, cx)? {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(EvalError::Unsupported(format!(
                "cannot negate non-boolean {other}"
            ))),
        },
        Expr::Binary(b) => eval_binary(b.op, &b.left, &b.right, cx),
        Expr::In(i) => {
            let value = eval(&i.value, cx)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            match eval(&i.range, cx)? {
                Value::Range(r) => Ok(Value::Boolean(r.contains(&value))),
                other => Err(EvalError::Unsupported(format!(
                    "in requires a range, found {other}"
                ))),
            }
        }
        Expr::Range(r) => {
            let lane = match r.ty {
                relq_types::Type::Range(ref elem) => {
                    elem.primitive().unwrap_or(Primitive::Long)
                }
                _ => Primitive::Long,
            };
            let start = r
                .start
                .as_ref()
                .map(|e| eval(e, cx))
                .transpose()?
                .filter(|v| !v.is_null());
            let end = r
                .end
                .as_ref()
                .map(|e| eval(e, cx))
                .transpose()?
                .filter(|v| !v.is_null());
            Ok(Value::Range(Box::new(RangeValue::new(lane, start, end))))
        }
        Expr::Call(c) => match c.applier.kind() {
            ApplierKind::Plain => {
                let mut source = ExprArgSource {
                    exprs: &c.args,
                    cx,
                };
                c.applier.eval_plain(&mut source)
            }
            _ => Err(EvalError::Unsupported(format!(
                "{} must run inside an aggregation or window operator",
                c.name
            ))),
        },
    }
}

fn eval_column(c: &ColumnExpr, cx: &mut EvalContext<'_>) -> Result<Value, EvalError> {
    if c.is_wildcard() {
        return Err(EvalError::Unsupported(
            "wildcard column was not expanded before evaluation".into(),
        ));
    }
    // Subpaths materialize as flat dotted names in scanned rows.
    let name = c.path.join(".");
    cx.row
        .get_named(&name)
        .cloned()
        .ok_or_else(|| EvalError::Unsupported(format!("row has no column {name}")))
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    cx: &mut EvalContext<'_>,
) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => match eval(left, cx)? {
            Value::Boolean(false) => Ok(Value::Boolean(false)),
            l => match (l, eval(right, cx)?) {
                (Value::Boolean(true), r) => Ok(r),
                (_, Value::Boolean(false)) => Ok(Value::Boolean(false)),
                _ => Ok(Value::Null),
            },
        },
        BinaryOp::Or => match eval(left, cx)? {
            Value::Boolean(true) => Ok(Value::Boolean(true)),
            l => match (l, eval(right, cx)?) {
                (Value::Boolean(false), r) => Ok(r),
                (_, Value::Boolean(true)) => Ok(Value::Boolean(true)),
                _ => Ok(Value::Null),
            },
        },
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::Xor => {
            let l = eval(left, cx)?;
            let r = eval(right, cx)?;
            match (l, r) {
                (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(match op {
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    _ => a ^ b,
                })),
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (a, b) => Err(EvalError::Unsupported(format!(
                    "{} requires boolean operands, found {a} and {b}",
                    op.symbol()
                ))),
            }
        }
        op if op.is_comparison() => {
            let l = eval(left, cx)?;
            let r = eval(right, cx)?;
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            match l.compare(&r) {
                Some(ord) => Ok(Value::Boolean(match op {
                    BinaryOp::Eq => ord.is_eq(),
                    BinaryOp::Ne => ord.is_ne(),
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    BinaryOp::Ge => ord.is_ge(),
                    _ => unreachable!(),
                })),
                None => Err(EvalError::Unsupported(format!(
                    "cannot compare {l} with {r}"
                ))),
            }
        }
        _ => {
            let l = eval(left, cx)?;
            let r = eval(right, cx)?;
            let arith_op = match op {
                BinaryOp::Add => arith::ArithOp::Add,
                BinaryOp::Sub => arith::ArithOp::Sub,
                BinaryOp::Mul => arith::ArithOp::Mul,
                BinaryOp::Div => arith::ArithOp::Div,
                BinaryOp::Rem => arith::ArithOp::Rem,
                other => {
                    return Err(EvalError::Unsupported(format!(
                        "operator {} is not evaluable",
                        other.symbol()
                    )));
                }
            };
            Ok(arith::apply(arith_op, &l, &r)?)
        }
    }
}

/// Lazy argument access backed by the walker
struct ExprArgSource<'a, 'b, 'c> {
    exprs: &'a [Expr],
    cx: &'b mut EvalContext<'c>,
}

impl ArgSource for ExprArgSource<'_, '_, '_> {
    fn len(&self) -> usize {
        self.exprs.len()
    }

    fn value(&mut self, index: usize) -> Result<Value, EvalError> {
        eval(&self.exprs[index], self.cx)
    }
}

/// Evaluate a boolean filter: a null result is a non-match.
pub fn eval_filter(expr: &Expr, cx: &mut EvalContext<'_>) -> Result<bool, EvalError> {
    Ok(matches!(eval(expr, cx)?, Value::Boolean(true)))
}
