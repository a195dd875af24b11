// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Type lattice, dynamic values and exact arithmetic for relq.
//!
//! This crate is the leaf of the workspace: every other crate builds on
//! the types defined here.
//!
//! - [`Type`] / [`TupleType`] / [`Column`] — the semantic type lattice
//! - [`Value`] / [`Row`] — the dynamic runtime representation
//! - [`arith`] — checked exact arithmetic over value lanes
//! - [`RangeValue`] — inclusive ranges with materialized open ends

pub mod arith;
pub mod cardinality;
pub mod column;
pub mod error;
pub mod range;
pub mod row;
pub mod tuple;
pub mod ty;
pub mod value;

// Re-exports for convenience
pub use cardinality::Cardinality;
pub use column::{escape_name, split_path, Column};
pub use error::{ArithmeticError, ConvertError, EvalError, TypeError, TypeResult};
pub use range::{lane_max, lane_min, RangeValue};
pub use row::Row;
pub use tuple::TupleType;
pub use ty::{BasicType, OpCategory, Primitive, RelationType, Type};
pub use value::Value;
