// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Error types for the type and value layer

use thiserror::Error;

/// Result type alias for type-level operations
pub type TypeResult<T> = Result<T, TypeError>;

/// Errors raised while constructing or combining types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Two columns with the same name in one tuple type
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// Column not found in a tuple type
    #[error("Column not found: {0}")]
    UnknownColumn(String),

    /// No common type exists for the two operand types
    #[error("No common type for {left} and {right}")]
    NoCommonType { left: String, right: String },

    /// A projection asked for columns the tuple type cannot provide
    #[error("Tuple type cannot represent projection column: {0}")]
    CannotRepresent(String),

    /// Row constructed with the wrong number of values
    #[error("Row value count mismatch: schema has {expected} columns, got {found}")]
    RowWidthMismatch { expected: usize, found: usize },
}

/// Errors raised by exact arithmetic at evaluation time
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    /// The mathematically exact result does not fit the operand lane
    #[error("Arithmetic overflow in {op} on {lane}")]
    Overflow { op: &'static str, lane: &'static str },

    /// Integer or decimal division by zero
    #[error("Division by zero")]
    DivideByZero,

    /// Operands reached arithmetic without a shared numeric lane
    #[error("Unsupported operand lanes for {op}: {left} and {right}")]
    UnsupportedOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Union of the errors a compiled operator can raise per row. Runtime
/// evaluation errors propagate out of scanning; they are never compile
/// errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// A null reached a non-nullable projection target
    #[error("Null value in non-nullable column: {0}")]
    NullNotAllowed(String),

    /// Evaluation reached a construct the operator cannot execute
    #[error("Cannot evaluate: {0}")]
    Unsupported(String),
}

/// Errors raised by runtime value conversion
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Null converted into a non-nullable target
    #[error("Null value cannot convert to non-nullable {target}")]
    NullNotAllowed { target: String },

    /// Value does not fit the target lane
    #[error("Value {value} out of range for {target}")]
    OutOfRange { value: String, target: String },

    /// Conversion would silently lose information
    #[error("Value {value} cannot be represented exactly as {target}")]
    Inexact { value: String, target: String },

    /// No conversion exists between the lanes at all
    #[error("Cannot convert {from} to {to}")]
    Incompatible { from: String, to: String },
}
