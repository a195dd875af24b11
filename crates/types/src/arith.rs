// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Exact arithmetic
//!
//! Checked arithmetic over [`Value`] lanes. Fixed-width integer lanes
//! fail with [`ArithmeticError::Overflow`] exactly when the
//! mathematically exact result does not fit the lane, and with
//! [`ArithmeticError::DivideByZero`] on zero divisors. Float lanes use
//! IEEE semantics (division by zero produces infinity or NaN). The big
//! lanes never overflow; decimal division rounds to a fixed 64-digit
//! precision.
//!
//! Operands of differing numeric lanes are first brought to their common
//! lane, so accumulators can fold mixed-width inputs safely. A null
//! operand propagates to a null result.

use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::error::ArithmeticError;
use crate::ty::{OpCategory, Primitive, Type};
use crate::value::Value;

/// Arithmetic operators with exact semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

/// Decimal division precision, in significant decimal digits.
pub const DECIMAL_PRECISION: u64 = 64;

fn overflow(op: ArithOp, lane: Primitive) -> ArithmeticError {
    ArithmeticError::Overflow {
        op: op.symbol(),
        lane: lane.name(),
    }
}

macro_rules! fixed_lane {
    ($op:expr, $x:expr, $y:expr, $variant:ident, $lane:expr) => {{
        let (x, y) = ($x, $y);
        match $op {
            ArithOp::Add => x.checked_add(y).map(Value::$variant),
            ArithOp::Sub => x.checked_sub(y).map(Value::$variant),
            ArithOp::Mul => x.checked_mul(y).map(Value::$variant),
            ArithOp::Div if y.is_zero() => return Err(ArithmeticError::DivideByZero),
            ArithOp::Div => x.checked_div(y).map(Value::$variant),
            ArithOp::Rem if y.is_zero() => return Err(ArithmeticError::DivideByZero),
            ArithOp::Rem => x.checked_rem(y).map(Value::$variant),
        }
        .ok_or_else(|| overflow($op, $lane))
    }};
}

/// Apply an arithmetic operator to two values.
pub fn apply(op: ArithOp, a: &Value, b: &Value) -> Result<Value, ArithmeticError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = coerce(op, a, b)?;
    use Primitive as P;
    match (&a, &b) {
        (Value::Byte(x), Value::Byte(y)) => fixed_lane!(op, *x, *y, Byte, P::Byte),
        (Value::Short(x), Value::Short(y)) => fixed_lane!(op, *x, *y, Short, P::Short),
        (Value::Int(x), Value::Int(y)) => fixed_lane!(op, *x, *y, Int, P::Int),
        (Value::Long(x), Value::Long(y)) => fixed_lane!(op, *x, *y, Long, P::Long),
        (Value::UByte(x), Value::UByte(y)) => fixed_lane!(op, *x, *y, UByte, P::UByte),
        (Value::UShort(x), Value::UShort(y)) => fixed_lane!(op, *x, *y, UShort, P::UShort),
        (Value::UInt(x), Value::UInt(y)) => fixed_lane!(op, *x, *y, UInt, P::UInt),
        (Value::ULong(x), Value::ULong(y)) => fixed_lane!(op, *x, *y, ULong, P::ULong),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Rem => x % y,
        })),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Rem => x % y,
        })),
        (Value::BigInteger(x), Value::BigInteger(y)) => {
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y.is_zero() {
                return Err(ArithmeticError::DivideByZero);
            }
            Ok(Value::BigInteger(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
            }))
        }
        (Value::BigDecimal(x), Value::BigDecimal(y)) => {
            if matches!(op, ArithOp::Div | ArithOp::Rem) && y.is_zero() {
                return Err(ArithmeticError::DivideByZero);
            }
            Ok(Value::BigDecimal(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => (x / y).with_prec(DECIMAL_PRECISION),
                ArithOp::Rem => x % y,
            }))
        }
        _ => Err(unsupported(op, &a, &b)),
    }
}

/// Smaller of two comparable values; unsigned lanes compare unsigned.
/// A null operand yields the other operand.
pub fn min(a: &Value, b: &Value) -> Result<Value, ArithmeticError> {
    pick(a, b, std::cmp::Ordering::Less)
}

/// Larger of two comparable values; unsigned lanes compare unsigned.
/// A null operand yields the other operand.
pub fn max(a: &Value, b: &Value) -> Result<Value, ArithmeticError> {
    pick(a, b, std::cmp::Ordering::Greater)
}

fn pick(a: &Value, b: &Value, keep_a: std::cmp::Ordering) -> Result<Value, ArithmeticError> {
    if a.is_null() {
        return Ok(b.clone());
    }
    if b.is_null() {
        return Ok(a.clone());
    }
    match a.compare(b) {
        Some(ord) if ord == keep_a || ord == std::cmp::Ordering::Equal => Ok(a.clone()),
        Some(_) => Ok(b.clone()),
        None => Err(unsupported(ArithOp::Sub, a, b)),
    }
}

fn unsupported(op: ArithOp, a: &Value, b: &Value) -> ArithmeticError {
    ArithmeticError::UnsupportedOperands {
        op: op.symbol(),
        left: a.primitive().map(Primitive::name).unwrap_or("null"),
        right: b.primitive().map(Primitive::name).unwrap_or("null"),
    }
}

fn coerce(op: ArithOp, a: &Value, b: &Value) -> Result<(Value, Value), ArithmeticError> {
    let (pa, pb) = match (a.primitive(), b.primitive()) {
        (Some(pa), Some(pb)) => (pa, pb),
        _ => return Err(unsupported(op, a, b)),
    };
    if pa == pb {
        return Ok((a.clone(), b.clone()));
    }
    let common = Type::basic(pa)
        .common_type(&Type::basic(pb), OpCategory::Arithmetic)
        .ok_or_else(|| unsupported(op, a, b))?;
    // Common-lane conversion is widening and cannot fail for in-range
    // operands; a failure means the lanes were not numeric after all.
    let ca = a.convert(&common).map_err(|_| unsupported(op, a, b))?;
    let cb = b.convert(&common).map_err(|_| unsupported(op, a, b))?;
    Ok((ca, cb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_fixed_overflow() {
        let err = apply(ArithOp::Add, &Value::Byte(100), &Value::Byte(100)).unwrap_err();
        assert!(matches!(err, ArithmeticError::Overflow { op: "+", .. }));

        assert_eq!(
            apply(ArithOp::Add, &Value::Byte(100), &Value::Byte(27)).unwrap(),
            Value::Byte(127)
        );
    }

    #[test]
    fn test_unsigned_overflow() {
        let err = apply(ArithOp::Sub, &Value::UByte(0), &Value::UByte(1)).unwrap_err();
        assert!(matches!(err, ArithmeticError::Overflow { .. }));

        let err = apply(ArithOp::Mul, &Value::ULong(u64::MAX), &Value::ULong(2)).unwrap_err();
        assert!(matches!(err, ArithmeticError::Overflow { .. }));
    }

    #[test]
    fn test_division() {
        assert_eq!(
            apply(ArithOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            apply(ArithOp::Div, &Value::Int(7), &Value::Int(0)).unwrap_err(),
            ArithmeticError::DivideByZero
        );
        // Signed division overflow: MIN / -1 does not fit.
        assert!(matches!(
            apply(ArithOp::Div, &Value::Int(i32::MIN), &Value::Int(-1)),
            Err(ArithmeticError::Overflow { .. })
        ));
        // IEEE division by zero.
        assert_eq!(
            apply(ArithOp::Div, &Value::Double(1.0), &Value::Double(0.0)).unwrap(),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn test_big_lanes_never_overflow() {
        let big = Value::BigInteger(BigInt::from(i64::MAX));
        let r = apply(ArithOp::Mul, &big, &big).unwrap();
        assert_eq!(
            r,
            Value::BigInteger(BigInt::from(i64::MAX) * BigInt::from(i64::MAX))
        );
    }

    #[test]
    fn test_decimal_division_precision() {
        let a = Value::BigDecimal(BigDecimal::from(1));
        let b = Value::BigDecimal(BigDecimal::from(3));
        match apply(ArithOp::Div, &a, &b).unwrap() {
            Value::BigDecimal(d) => {
                assert_eq!(d.digits(), DECIMAL_PRECISION);
            }
            other => panic!("expected decimal, got {other:?}"),
        }
        assert_eq!(
            apply(ArithOp::Div, &a, &Value::BigDecimal(BigDecimal::zero())).unwrap_err(),
            ArithmeticError::DivideByZero
        );
    }

    #[test]
    fn test_mixed_lane_coercion() {
        assert_eq!(
            apply(ArithOp::Add, &Value::Int(1), &Value::Long(2)).unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            apply(ArithOp::Add, &Value::UInt(1), &Value::Int(2)).unwrap(),
            Value::Long(3)
        );
    }

    #[test]
    fn test_null_propagates() {
        assert_eq!(
            apply(ArithOp::Add, &Value::Null, &Value::Int(1)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_min_max_unsigned() {
        assert_eq!(
            max(&Value::ULong(u64::MAX), &Value::ULong(1)).unwrap(),
            Value::ULong(u64::MAX)
        );
        assert_eq!(min(&Value::Null, &Value::Int(3)).unwrap(), Value::Int(3));
    }
}
