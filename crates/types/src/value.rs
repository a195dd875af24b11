// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Dynamic values
//!
//! [`Value`] is the runtime representation of every scalar the compiler
//! evaluates: one variant per primitive lane, plus `Null` and ranges.
//! Conversion between lanes is exact: a conversion that would silently
//! change a value fails instead.

use std::cmp::Ordering;
use std::fmt;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::range::RangeValue;
use crate::ty::{Primitive, Type};

/// A runtime scalar value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    UByte(u8),
    UShort(u16),
    UInt(u32),
    ULong(u64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(BigDecimal),
    Text(String),
    Char(char),
    Range(Box<RangeValue>),
}

impl Value {
    /// The primitive lane this value inhabits, `None` for `Null` and
    /// ranges.
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Value::Null | Value::Range(_) => return None,
            Value::Boolean(_) => Primitive::Boolean,
            Value::Byte(_) => Primitive::Byte,
            Value::Short(_) => Primitive::Short,
            Value::Int(_) => Primitive::Int,
            Value::Long(_) => Primitive::Long,
            Value::UByte(_) => Primitive::UByte,
            Value::UShort(_) => Primitive::UShort,
            Value::UInt(_) => Primitive::UInt,
            Value::ULong(_) => Primitive::ULong,
            Value::Float(_) => Primitive::Float,
            Value::Double(_) => Primitive::Double,
            Value::BigInteger(_) => Primitive::BigInteger,
            Value::BigDecimal(_) => Primitive::BigDecimal,
            Value::Text(_) => Primitive::Text,
            Value::Char(_) => Primitive::Char,
        })
    }

    /// The natural type of this value. `Null` has the top type.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null => Type::Any,
            Value::Range(r) => Type::Range(Box::new(r.element_type())),
            other => Type::basic(other.primitive().expect("scalar lane")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Byte(0) | Value::Short(0) | Value::Int(0) | Value::Long(0) => true,
            Value::UByte(0) | Value::UShort(0) | Value::UInt(0) | Value::ULong(0) => true,
            Value::Float(f) => *f == 0.0,
            Value::Double(f) => *f == 0.0,
            Value::BigInteger(i) => i.is_zero(),
            Value::BigDecimal(d) => d.is_zero(),
            _ => false,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            Value::Byte(1) | Value::Short(1) | Value::Int(1) | Value::Long(1) => true,
            Value::UByte(1) | Value::UShort(1) | Value::UInt(1) | Value::ULong(1) => true,
            Value::Float(f) => *f == 1.0,
            Value::Double(f) => *f == 1.0,
            Value::BigInteger(i) => i == &BigInt::from(1),
            Value::BigDecimal(d) => d == &BigDecimal::from(1),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Signed 128-bit view of a fixed-width integer value.
    pub fn to_i128(&self) -> Option<i128> {
        Some(match self {
            Value::Byte(v) => *v as i128,
            Value::Short(v) => *v as i128,
            Value::Int(v) => *v as i128,
            Value::Long(v) => *v as i128,
            Value::UByte(v) => *v as i128,
            Value::UShort(v) => *v as i128,
            Value::UInt(v) => *v as i128,
            Value::ULong(v) => *v as i128,
            _ => return None,
        })
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::BigInteger(v) => v.to_f64(),
            Value::BigDecimal(v) => v.to_f64(),
            other => other.to_i128().map(|i| i as f64),
        }
    }

    /// Exact decimal view of any numeric value. Non-finite floats have
    /// no decimal representation.
    pub fn to_big_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Float(v) => BigDecimal::from_f32(*v),
            Value::Double(v) => BigDecimal::from_f64(*v),
            Value::BigInteger(v) => Some(BigDecimal::from(v.clone())),
            Value::BigDecimal(v) => Some(v.clone()),
            other => other.to_i128().map(BigDecimal::from),
        }
    }

    /// Total comparison of two comparable values. `Null` compares equal
    /// only to `Null`; mixed null/non-null and incompatible lanes return
    /// `None` (callers decide null ordering). Unsigned lanes compare
    /// unsigned. Numeric values compare across lanes by value.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Char(a), Char(b)) => Some(a.cmp(b)),
            (Text(a), Char(b)) => {
                let b = b.to_string();
                Some(a.as_str().cmp(b.as_str()))
            }
            (Char(a), Text(b)) => {
                let a = a.to_string();
                Some(a.as_str().cmp(b.as_str()))
            }
            (a, b) => {
                if let (Some(x), Some(y)) = (a.to_i128(), b.to_i128()) {
                    return Some(x.cmp(&y));
                }
                match (a, b) {
                    (Float(x), Float(y)) => x.partial_cmp(y),
                    (Double(_), _) | (_, Double(_)) | (Float(_), _) | (_, Float(_)) => {
                        // Mixing a float lane with a big lane goes through
                        // the exact decimal view; NaN stays incomparable.
                        match (a, b) {
                            (BigInteger(_) | BigDecimal(_), _) | (_, BigInteger(_) | BigDecimal(_)) => {
                                a.to_big_decimal()?.partial_cmp(&b.to_big_decimal()?)
                            }
                            _ => a.to_f64()?.partial_cmp(&b.to_f64()?),
                        }
                    }
                    (BigInteger(x), BigInteger(y)) => Some(x.cmp(y)),
                    (BigInteger(_) | BigDecimal(_), _) | (_, BigInteger(_) | BigDecimal(_)) => {
                        a.to_big_decimal()?.partial_cmp(&b.to_big_decimal()?)
                    }
                    _ => None,
                }
            }
        }
    }

    /// Convert this value to the target type, exactly. Widening always
    /// succeeds; narrowing succeeds only when the value fits; a float
    /// converts to an integer lane only when it has no fractional part.
    pub fn convert(&self, target: &Type) -> Result<Value, ConvertError> {
        let prim = match target {
            Type::Any => return Ok(self.clone()),
            Type::Basic(b) => {
                if self.is_null() {
                    return if b.nullable {
                        Ok(Value::Null)
                    } else {
                        Err(ConvertError::NullNotAllowed {
                            target: target.to_string(),
                        })
                    };
                }
                b.primitive
            }
            _ => {
                return if &self.ty() == target {
                    Ok(self.clone())
                } else {
                    Err(ConvertError::Incompatible {
                        from: self.ty().to_string(),
                        to: target.to_string(),
                    })
                };
            }
        };
        if self.primitive() == Some(prim) {
            return Ok(self.clone());
        }
        self.convert_scalar(prim).ok_or_else(|| self.convert_error(prim))
    }

    fn convert_error(&self, prim: Primitive) -> ConvertError {
        let value = self.to_string();
        let target = prim.name().to_string();
        match self {
            Value::Float(_) | Value::Double(_) | Value::BigDecimal(_) if prim.is_integer() => {
                ConvertError::Inexact { value, target }
            }
            v if v.primitive().is_some_and(|p| p.is_number()) && prim.is_number() => {
                ConvertError::OutOfRange { value, target }
            }
            _ => ConvertError::Incompatible {
                from: self.ty().to_string(),
                to: target,
            },
        }
    }

    fn convert_scalar(&self, prim: Primitive) -> Option<Value> {
        use Primitive as P;
        match prim {
            P::Boolean => self.as_bool().map(Value::Boolean),
            P::Byte => self.to_exact_i128()?.to_i8().map(Value::Byte),
            P::Short => self.to_exact_i128()?.to_i16().map(Value::Short),
            P::Int => self.to_exact_i128()?.to_i32().map(Value::Int),
            P::Long => self.to_exact_i128()?.to_i64().map(Value::Long),
            P::UByte => self.to_exact_i128()?.to_u8().map(Value::UByte),
            P::UShort => self.to_exact_i128()?.to_u16().map(Value::UShort),
            P::UInt => self.to_exact_i128()?.to_u32().map(Value::UInt),
            P::ULong => self.to_exact_i128()?.to_u64().map(Value::ULong),
            P::Float => match self {
                Value::Double(v) => Some(Value::Float(*v as f32)),
                other => other.to_f64().map(|f| Value::Float(f as f32)),
            },
            P::Double => self.to_f64().map(Value::Double),
            P::BigInteger => match self {
                Value::Float(_) | Value::Double(_) | Value::BigDecimal(_) => {
                    let d = self.to_big_decimal()?;
                    decimal_to_bigint(&d).map(Value::BigInteger)
                }
                other => other.to_i128().map(|i| Value::BigInteger(BigInt::from(i))),
            },
            P::BigDecimal => self.to_big_decimal().map(Value::BigDecimal),
            P::Text => match self {
                Value::Text(s) => Some(Value::Text(s.clone())),
                Value::Char(c) => Some(Value::Text(c.to_string())),
                _ => None,
            },
            P::Char => match self {
                Value::Char(c) => Some(Value::Char(*c)),
                Value::Text(s) => {
                    let mut chars = s.chars();
                    let c = chars.next()?;
                    chars.next().is_none().then_some(Value::Char(c))
                }
                _ => None,
            },
        }
    }

    /// Integer view that also accepts integral floats and decimals.
    fn to_exact_i128(&self) -> Option<i128> {
        match self {
            Value::Float(_) | Value::Double(_) => {
                let f = self.to_f64()?;
                (f.fract() == 0.0 && f.is_finite()).then(|| f as i128)
            }
            Value::BigInteger(i) => i.to_i128(),
            Value::BigDecimal(d) => d.is_integer().then(|| d.to_i128())?,
            other => other.to_i128(),
        }
    }
}

/// Exact integer form of an integral decimal.
fn decimal_to_bigint(d: &BigDecimal) -> Option<BigInt> {
    if !d.is_integer() {
        return None;
    }
    let (digits, scale) = d.with_scale(0).as_bigint_and_exponent();
    debug_assert_eq!(scale, 0);
    Some(digits)
}

// Structural equality: float lanes compare by raw bits, consistent with
// the canonical key encoding, which makes `Eq` and `Hash` lawful. Use
// [`Value::compare`] for semantic comparison.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (UByte(a), UByte(b)) => a == b,
            (UShort(a), UShort(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (ULong(a), ULong(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (BigInteger(a), BigInteger(b)) => a == b,
            (BigDecimal(a), BigDecimal(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Range(a), Range(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Boolean(v) => v.hash(state),
            Byte(v) => v.hash(state),
            Short(v) => v.hash(state),
            Int(v) => v.hash(state),
            Long(v) => v.hash(state),
            UByte(v) => v.hash(state),
            UShort(v) => v.hash(state),
            UInt(v) => v.hash(state),
            ULong(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Double(v) => v.to_bits().hash(state),
            BigInteger(v) => v.hash(state),
            BigDecimal(v) => {
                // Consistent with decimal equality, which ignores
                // trailing zeros.
                let (digits, scale) = v.normalized().as_bigint_and_exponent();
                digits.hash(state);
                scale.hash(state);
            }
            Text(v) => v.hash(state),
            Char(v) => v.hash(state),
            Range(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::UByte(v) => write!(f, "{v}"),
            Value::UShort(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::ULong(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::BigInteger(v) => write!(f, "{v}G"),
            Value::BigDecimal(v) => write!(f, "{v}g"),
            Value::Text(v) => {
                f.write_str("\"")?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            Value::Char(v) => write!(f, "'{v}'"),
            Value::Range(r) => write!(f, "{r}"),
        }
    }
}

/// Negate a numeric value. With `widen` set, a value at the negative
/// extreme of its lane widens to the next lane instead of failing.
pub fn negate(value: &Value, widen: bool) -> Option<Value> {
    match value {
        Value::Byte(v) => match v.checked_neg() {
            Some(n) => Some(Value::Byte(n)),
            None if widen => Some(Value::Short(-(*v as i16))),
            None => None,
        },
        Value::Short(v) => match v.checked_neg() {
            Some(n) => Some(Value::Short(n)),
            None if widen => Some(Value::Int(-(*v as i32))),
            None => None,
        },
        Value::Int(v) => match v.checked_neg() {
            Some(n) => Some(Value::Int(n)),
            None if widen => Some(Value::Long(-(*v as i64))),
            None => None,
        },
        Value::Long(v) => match v.checked_neg() {
            Some(n) => Some(Value::Long(n)),
            None if widen => Some(Value::BigInteger(-BigInt::from(*v))),
            None => None,
        },
        Value::Float(v) => Some(Value::Float(-v)),
        Value::Double(v) => Some(Value::Double(-v)),
        Value::BigInteger(v) => Some(Value::BigInteger(-v.clone())),
        Value::BigDecimal(v) => Some(Value::BigDecimal(-v.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_unsigned() {
        let a = Value::ULong(u64::MAX);
        let b = Value::ULong(1);
        assert_eq!(a.compare(&b), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_cross_lane() {
        assert_eq!(
            Value::Int(5).compare(&Value::Long(5)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::UInt(7).compare(&Value::Byte(-1)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Null.compare(&Value::Int(0)), None);
    }

    #[test]
    fn test_convert_narrowing_checked() {
        let v = Value::Long(300);
        assert!(v.convert(&Type::basic(Primitive::Byte)).is_err());
        assert_eq!(
            v.convert(&Type::basic(Primitive::Short)).unwrap(),
            Value::Short(300)
        );
    }

    #[test]
    fn test_convert_float_exactness() {
        assert_eq!(
            Value::Double(4.0)
                .convert(&Type::basic(Primitive::Int))
                .unwrap(),
            Value::Int(4)
        );
        assert!(matches!(
            Value::Double(4.5).convert(&Type::basic(Primitive::Int)),
            Err(ConvertError::Inexact { .. })
        ));
    }

    #[test]
    fn test_convert_null() {
        assert_eq!(
            Value::Null
                .convert(&Type::basic_nullable(Primitive::Int))
                .unwrap(),
            Value::Null
        );
        assert!(matches!(
            Value::Null.convert(&Type::basic(Primitive::Int)),
            Err(ConvertError::NullNotAllowed { .. })
        ));
    }

    #[test]
    fn test_negate_widening() {
        assert_eq!(negate(&Value::Byte(i8::MIN), true), Some(Value::Short(128)));
        assert_eq!(negate(&Value::Byte(i8::MIN), false), None);
        assert_eq!(negate(&Value::Int(7), false), Some(Value::Int(-7)));
    }

    #[test]
    fn test_display_literals() {
        assert_eq!(Value::Long(5).to_string(), "5L");
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::Text("a\"b".into()).to_string(), "\"a\\\"b\"");
    }
}
