// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Query-text rendering of expressions.
//!
//! Printing is the inverse of parsing: for any parsed query,
//! `parse(print(parse(q))) == parse(q)`. Conversions print as their
//! operand (the conversion is implicit in the types), and parentheses
//! appear only where precedence demands them.

use std::fmt;

use crate::expr::{BinaryOp, Expr, ProjExpr, ProjFlags};

/// Binding power of each operator for parenthesization; higher binds
/// tighter. Mirrors the parser's precedence ladder.
fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::BitOr => 3,
        BinaryOp::Xor => 4,
        BinaryOp::BitAnd => 5,
        BinaryOp::Eq | BinaryOp::Ne => 6,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
        BinaryOp::Add | BinaryOp::Sub => 9,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 10,
    }
}

const PREC_IN: u8 = 8;
const PREC_UNARY: u8 = 11;
const PREC_ATOM: u8 = 12;

impl Expr {
    fn prec(&self) -> u8 {
        match self {
            Expr::Binary(b) => precedence(b.op),
            Expr::In(_) => PREC_IN,
            Expr::Not(_) => PREC_UNARY,
            Expr::Conversion(c) => c.expr.prec(),
            Expr::Assign(_) => 0,
            _ => PREC_ATOM,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let prec = self.prec();
        let parens = prec < min;
        if parens {
            f.write_str("(")?;
        }
        match self {
            Expr::Constant(c) => write!(f, "{}", c.value)?,
            Expr::Param(p) => write!(f, "?{}", p.ordinal)?,
            Expr::Column(c) => {
                if c.is_wildcard() {
                    f.write_str("*")?;
                } else {
                    f.write_str(&c.printed_name())?;
                }
            }
            Expr::Var(v) => f.write_str(&v.name)?,
            Expr::Assign(a) => {
                write!(f, "{} = ", a.name)?;
                a.expr.fmt_prec(f, 1)?;
            }
            Expr::Conversion(c) => c.expr.fmt_prec(f, min.max(prec))?,
            Expr::Not(n) => {
                f.write_str("!")?;
                n.expr.fmt_prec(f, PREC_UNARY)?;
            }
            Expr::Binary(b) => {
                b.left.fmt_prec(f, prec)?;
                write!(f, " {} ", b.op.symbol())?;
                // Right operand binds one tighter: operators here are
                // left-associative.
                b.right.fmt_prec(f, prec + 1)?;
            }
            Expr::In(i) => {
                i.value.fmt_prec(f, PREC_IN + 1)?;
                f.write_str(" in ")?;
                i.range.fmt_prec(f, PREC_IN + 1)?;
            }
            Expr::Range(r) => {
                if let Some(s) = &r.start {
                    s.fmt_prec(f, PREC_ATOM)?;
                }
                f.write_str("..")?;
                if let Some(e) = &r.end {
                    e.fmt_prec(f, PREC_ATOM)?;
                }
            }
            Expr::Call(c) => {
                write!(f, "{}(", c.name)?;
                let mut first = true;
                for a in &c.args {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    a.fmt_prec(f, 1)?;
                }
                for (n, a) in &c.named_args {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{n}: ")?;
                    a.fmt_prec(f, 1)?;
                }
                f.write_str(")")?;
            }
        }
        if parens {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl fmt::Display for ProjExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.contains(ProjFlags::EXCLUDE) {
            f.write_str("~")?;
        }
        if self.flags.contains(ProjFlags::ORDER_BY) {
            if self.flags.contains(ProjFlags::DESCENDING) {
                f.write_str("-")?;
            } else {
                f.write_str("+")?;
            }
            if self.flags.contains(ProjFlags::NULL_LOW) {
                f.write_str("!")?;
            }
        }
        match &self.expr {
            Expr::Column(c) if !c.is_wildcard() && c.printed_name() == self.name => {
                f.write_str(&self.name)
            }
            Expr::Column(c) if c.is_wildcard() => f.write_str("*"),
            // An assignment already renders as `name = expr`.
            Expr::Assign(a) if a.name == self.name => self.expr.fmt_prec(f, 0),
            expr => {
                write!(f, "{} = ", relq_types::escape_name(&self.name))?;
                expr.fmt_prec(f, 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryExpr, ConstantExpr, ParamExpr};
    use crate::span::Span;
    use relq_types::Value;

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    fn param(n: usize) -> Expr {
        Expr::Param(ParamExpr::new(Span::default(), n))
    }

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        BinaryExpr::make(Span::default(), op, l, r).unwrap()
    }

    #[test]
    fn test_precedence_parens() {
        // (p1 + p2) * p3 keeps its parentheses; p1 + p2 * p3 does not
        // gain any.
        let sum = bin(BinaryOp::Add, param(1), param(2));
        let e = bin(BinaryOp::Mul, sum, param(3));
        assert_eq!(e.to_string(), "(?1 + ?2) * ?3");

        let prod = bin(BinaryOp::Mul, param(2), param(3));
        let e = bin(BinaryOp::Add, param(1), prod);
        assert_eq!(e.to_string(), "?1 + ?2 * ?3");
    }

    #[test]
    fn test_literal_rendering() {
        let e = bin(BinaryOp::Add, constant(Value::Long(1)), param(1));
        assert_eq!(e.to_string(), "1L + ?1");
    }

    #[test]
    fn test_logical_rendering() {
        let lt = bin(BinaryOp::Lt, param(1), constant(Value::Int(3)));
        let gt = bin(BinaryOp::Gt, param(2), constant(Value::Int(4)));
        let e = bin(BinaryOp::And, lt, gt);
        assert_eq!(e.to_string(), "?1 < 3 && ?2 > 4");
    }
}
