// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The type lattice
//!
//! This module defines the closed family of semantic types used by the
//! query compiler: scalar basic types with a nullable bit, tuple (row)
//! types, relation types with a cardinality, and range types.
//!
//! ## Design
//!
//! A non-nullable type and its nullable peer are distinct types. All
//! binary operations go through [`Type::common_type`], which computes the
//! least upper bound of the operand types for a given operator category,
//! or reports that none exists. The lattice favors exactness: mixing an
//! integer lane with a float lane widens to `Double`, and mixing
//! `BigInteger` with a float lane widens to `BigDecimal`, so that exact
//! source values are never silently truncated.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cardinality::Cardinality;
use crate::tuple::TupleType;

/// Scalar primitive lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    UByte,
    UShort,
    UInt,
    ULong,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    Text,
    Char,
}

impl Primitive {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Byte
                | Primitive::Short
                | Primitive::Int
                | Primitive::Long
                | Primitive::UByte
                | Primitive::UShort
                | Primitive::UInt
                | Primitive::ULong
                | Primitive::BigInteger
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Primitive::UByte | Primitive::UShort | Primitive::UInt | Primitive::ULong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }

    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_float() || self == Primitive::BigDecimal
    }

    /// Width rank of a fixed integer lane: byte=1, short=2, int=3, long=4.
    /// `None` for everything else.
    pub fn fixed_rank(self) -> Option<u8> {
        match self {
            Primitive::Byte | Primitive::UByte => Some(1),
            Primitive::Short | Primitive::UShort => Some(2),
            Primitive::Int | Primitive::UInt => Some(3),
            Primitive::Long | Primitive::ULong => Some(4),
            _ => None,
        }
    }

    fn signed_of_rank(rank: u8) -> Option<Primitive> {
        match rank {
            1 => Some(Primitive::Byte),
            2 => Some(Primitive::Short),
            3 => Some(Primitive::Int),
            4 => Some(Primitive::Long),
            _ => None,
        }
    }

    fn unsigned_of_rank(rank: u8) -> Option<Primitive> {
        match rank {
            1 => Some(Primitive::UByte),
            2 => Some(Primitive::UShort),
            3 => Some(Primitive::UInt),
            4 => Some(Primitive::ULong),
            _ => None,
        }
    }

    /// Lane name as it appears in query text and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::UByte => "ubyte",
            Primitive::UShort => "ushort",
            Primitive::UInt => "uint",
            Primitive::ULong => "ulong",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::BigInteger => "big_integer",
            Primitive::BigDecimal => "big_decimal",
            Primitive::Text => "string",
            Primitive::Char => "char",
        }
    }
}

/// A scalar type: a primitive lane plus a nullable bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasicType {
    pub primitive: Primitive,
    pub nullable: bool,
}

impl BasicType {
    pub fn new(primitive: Primitive) -> Self {
        Self {
            primitive,
            nullable: false,
        }
    }

    pub fn nullable(primitive: Primitive) -> Self {
        Self {
            primitive,
            nullable: true,
        }
    }
}

/// Category of a binary operator, as far as typing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCategory {
    /// `&&`, `||`, boolean `&`, `|`, `^` — both operands must be boolean
    Logical,
    /// `==`, `!=`, `<`, `<=`, `>`, `>=` — any shared lane
    Comparison,
    /// `+`, `-`, `*`, `/`, `%` — numeric lanes only
    Arithmetic,
}

/// The closed type variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Top type, used by untyped wildcards before projection expansion
    Any,
    Basic(BasicType),
    Tuple(Arc<TupleType>),
    Relation(RelationType),
    /// A range over a scalar element type
    Range(Box<Type>),
}

/// A lazy sequence of tuples with a known row shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationType {
    pub row_type: Arc<TupleType>,
    pub cardinality: Cardinality,
}

impl Type {
    pub const BOOLEAN: Type = Type::Basic(BasicType {
        primitive: Primitive::Boolean,
        nullable: false,
    });

    pub fn basic(primitive: Primitive) -> Type {
        Type::Basic(BasicType::new(primitive))
    }

    pub fn basic_nullable(primitive: Primitive) -> Type {
        Type::Basic(BasicType::nullable(primitive))
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Any => true,
            Type::Basic(b) => b.nullable,
            Type::Tuple(_) | Type::Relation(_) | Type::Range(_) => false,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Type::Basic(BasicType {
                primitive: Primitive::Boolean,
                ..
            })
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Basic(b) if b.primitive.is_integer())
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Type::Basic(b) if b.primitive.is_number())
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, Type::Basic(b) if b.primitive.is_unsigned_integer())
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Basic(b) => Some(b.primitive),
            _ => None,
        }
    }

    /// The nullable peer of this type. Identity for types that are already
    /// nullable and for non-scalar types.
    pub fn nullable(&self) -> Type {
        match self {
            Type::Basic(b) => Type::Basic(BasicType {
                primitive: b.primitive,
                nullable: true,
            }),
            other => other.clone(),
        }
    }

    /// The non-nullable peer of this type.
    pub fn non_nullable(&self) -> Type {
        match self {
            Type::Basic(b) => Type::Basic(BasicType {
                primitive: b.primitive,
                nullable: false,
            }),
            other => other.clone(),
        }
    }

    /// Least upper bound of `self` and `other` under the operator
    /// category, or `None` when the operands cannot be combined.
    ///
    /// The result is nullable when either operand is nullable. `Any`
    /// unifies to the other operand.
    pub fn common_type(&self, other: &Type, op: OpCategory) -> Option<Type> {
        match (self, other) {
            (Type::Any, t) | (t, Type::Any) => Some(t.clone()),
            (Type::Basic(a), Type::Basic(b)) => {
                let primitive = common_primitive(a.primitive, b.primitive, op)?;
                Some(Type::Basic(BasicType {
                    primitive,
                    nullable: a.nullable || b.nullable,
                }))
            }
            (Type::Range(a), Type::Range(b)) => {
                let elem = a.common_type(b, op)?;
                Some(Type::Range(Box::new(elem)))
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

impl From<Primitive> for Type {
    fn from(primitive: Primitive) -> Self {
        Type::basic(primitive)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Basic(b) => {
                if b.nullable {
                    write!(f, "{}?", b.primitive.name())
                } else {
                    f.write_str(b.primitive.name())
                }
            }
            Type::Tuple(t) => write!(f, "{t}"),
            Type::Relation(r) => write!(f, "relation[{}]", r.row_type),
            Type::Range(e) => write!(f, "range[{e}]"),
        }
    }
}

fn common_primitive(a: Primitive, b: Primitive, op: OpCategory) -> Option<Primitive> {
    use Primitive::*;

    if op == OpCategory::Logical {
        return (a == Boolean && b == Boolean).then_some(Boolean);
    }
    if a == b {
        return match op {
            OpCategory::Arithmetic if !a.is_number() => None,
            _ => Some(a),
        };
    }
    match (a, b) {
        (Char, Text) | (Text, Char) if op != OpCategory::Arithmetic => Some(Text),
        _ if !a.is_number() || !b.is_number() => None,
        (BigDecimal, _) | (_, BigDecimal) => Some(BigDecimal),
        (BigInteger, x) | (x, BigInteger) => {
            if x.is_float() {
                Some(BigDecimal)
            } else {
                Some(BigInteger)
            }
        }
        (Double, _) | (_, Double) => Some(Double),
        (Float, x) | (x, Float) => {
            if x.is_integer() {
                Some(Double)
            } else {
                Some(Float)
            }
        }
        _ => {
            // Both fixed-width integers of differing lanes.
            let (ra, rb) = (a.fixed_rank()?, b.fixed_rank()?);
            match (a.is_unsigned_integer(), b.is_unsigned_integer()) {
                (false, false) => Primitive::signed_of_rank(ra.max(rb)),
                (true, true) => Primitive::unsigned_of_rank(ra.max(rb)),
                (ua, _) => {
                    // Mixed signedness takes the narrowest signed lane that
                    // holds both; past long that is the big integer lane.
                    let (ru, rs) = if ua { (ra, rb) } else { (rb, ra) };
                    let rank = rs.max(ru + 1);
                    Primitive::signed_of_rank(rank).or(Some(BigInteger))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(p: Primitive) -> Type {
        Type::basic(p)
    }

    #[test]
    fn test_nullable_is_distinct() {
        let t = basic(Primitive::Int);
        let n = t.nullable();
        assert_ne!(t, n);
        assert!(n.is_nullable());
        assert_eq!(n.nullable(), n);
        assert_eq!(n.non_nullable(), t);
    }

    #[test]
    fn test_common_widening() {
        let c = basic(Primitive::Byte)
            .common_type(&basic(Primitive::Int), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::Int));

        let c = basic(Primitive::UByte)
            .common_type(&basic(Primitive::UShort), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::UShort));
    }

    #[test]
    fn test_common_mixed_signedness() {
        let c = basic(Primitive::UInt)
            .common_type(&basic(Primitive::Int), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::Long));

        let c = basic(Primitive::ULong)
            .common_type(&basic(Primitive::Byte), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::BigInteger));
    }

    #[test]
    fn test_common_float_exactness() {
        let c = basic(Primitive::Int)
            .common_type(&basic(Primitive::Float), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::Double));

        let c = basic(Primitive::BigInteger)
            .common_type(&basic(Primitive::Double), OpCategory::Arithmetic)
            .unwrap();
        assert_eq!(c, basic(Primitive::BigDecimal));
    }

    #[test]
    fn test_logical_requires_boolean() {
        assert_eq!(
            basic(Primitive::Int).common_type(&basic(Primitive::Int), OpCategory::Logical),
            None
        );
        assert_eq!(
            Type::BOOLEAN.common_type(&Type::BOOLEAN, OpCategory::Logical),
            Some(Type::BOOLEAN)
        );
    }

    #[test]
    fn test_nullable_propagates() {
        let c = basic(Primitive::Int)
            .nullable()
            .common_type(&basic(Primitive::Long), OpCategory::Comparison)
            .unwrap();
        assert!(c.is_nullable());
        assert_eq!(c.primitive(), Some(Primitive::Long));
    }

    #[test]
    fn test_no_common_type() {
        assert_eq!(
            basic(Primitive::Text).common_type(&basic(Primitive::Int), OpCategory::Comparison),
            None
        );
        assert_eq!(
            basic(Primitive::Text).common_type(&basic(Primitive::Text), OpCategory::Arithmetic),
            None
        );
    }

    #[test]
    fn test_any_unifies() {
        let c = Type::Any
            .common_type(&basic(Primitive::Long), OpCategory::Comparison)
            .unwrap();
        assert_eq!(c, basic(Primitive::Long));
    }
}
