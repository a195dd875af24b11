// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Range values
//!
//! A range is a pair of inclusive endpoints over one scalar lane. Open
//! ends are materialized as the lane's numeric extremes where the lane
//! has them; the big lanes, which have no extremes, use `Null` endpoints
//! that the unboundedness predicates recognize.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ty::{Primitive, Type};
use crate::value::Value;

/// An inclusive range of scalar values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeValue {
    pub start: Value,
    pub end: Value,
}

impl RangeValue {
    /// Build a range over the given lane, filling open ends with the
    /// lane's extremes.
    pub fn new(lane: Primitive, start: Option<Value>, end: Option<Value>) -> Self {
        Self {
            start: start.unwrap_or_else(|| lane_min(lane)),
            end: end.unwrap_or_else(|| lane_max(lane)),
        }
    }

    /// Element type of the range, derived from its endpoints.
    pub fn element_type(&self) -> Type {
        let endpoint = if self.start.is_null() {
            &self.end
        } else {
            &self.start
        };
        endpoint
            .primitive()
            .map(Type::basic)
            .unwrap_or(Type::Any)
    }

    pub fn is_unbounded_start(&self) -> bool {
        self.start.is_null()
            || self
                .start
                .primitive()
                .is_some_and(|p| self.start == lane_min(p))
    }

    pub fn is_unbounded_end(&self) -> bool {
        self.end.is_null()
            || self
                .end
                .primitive()
                .is_some_and(|p| self.end == lane_max(p))
    }

    /// Inclusive membership. Null endpoints are unbounded on their side;
    /// a null probe is never contained.
    pub fn contains(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        let above_start = self.start.is_null()
            || matches!(
                value.compare(&self.start),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            );
        let below_end = self.end.is_null()
            || matches!(
                value.compare(&self.end),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            );
        above_start && below_end
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_unbounded_start() {
            write!(f, "{}", self.start)?;
        }
        f.write_str("..")?;
        if !self.is_unbounded_end() {
            write!(f, "{}", self.end)?;
        }
        Ok(())
    }
}

/// The smallest value of a lane, or `Null` when the lane is unbounded.
pub fn lane_min(lane: Primitive) -> Value {
    match lane {
        Primitive::Byte => Value::Byte(i8::MIN),
        Primitive::Short => Value::Short(i16::MIN),
        Primitive::Int => Value::Int(i32::MIN),
        Primitive::Long => Value::Long(i64::MIN),
        Primitive::UByte => Value::UByte(0),
        Primitive::UShort => Value::UShort(0),
        Primitive::UInt => Value::UInt(0),
        Primitive::ULong => Value::ULong(0),
        Primitive::Float => Value::Float(f32::NEG_INFINITY),
        Primitive::Double => Value::Double(f64::NEG_INFINITY),
        _ => Value::Null,
    }
}

/// The largest value of a lane, or `Null` when the lane is unbounded.
pub fn lane_max(lane: Primitive) -> Value {
    match lane {
        Primitive::Byte => Value::Byte(i8::MAX),
        Primitive::Short => Value::Short(i16::MAX),
        Primitive::Int => Value::Int(i32::MAX),
        Primitive::Long => Value::Long(i64::MAX),
        Primitive::UByte => Value::UByte(u8::MAX),
        Primitive::UShort => Value::UShort(u16::MAX),
        Primitive::UInt => Value::UInt(u32::MAX),
        Primitive::ULong => Value::ULong(u64::MAX),
        Primitive::Float => Value::Float(f32::INFINITY),
        Primitive::Double => Value::Double(f64::INFINITY),
        _ => Value::Null,
    }
}
