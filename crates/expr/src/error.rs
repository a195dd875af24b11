// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Compile-time expression errors
//!
//! Every error carries the source span it was raised at. All compile
//! errors are fatal to the compilation; nothing partial is surfaced.

use thiserror::Error;

use crate::span::Span;

/// Result type alias for expression construction
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors raised while building or transforming expressions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Operand types cannot be combined, or a boolean was required
    #[error("Type mismatch at {}..{}: {message}", span.start, span.end)]
    TypeMismatch { message: String, span: Span },

    /// Unknown column, variable or function
    #[error("Unresolved name at {}..{}: {name}{}", span.start, span.end,
            reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default())]
    UnresolvedName {
        name: String,
        reason: Option<String>,
        span: Span,
    },

    /// Column referenced outside the aggregation group, or an aggregate
    /// over an accumulating sub-expression
    #[error("Invalid aggregation at {}..{}: {message}", span.start, span.end)]
    AggregationMisuse { message: String, span: Span },

    /// Repeated projection name or assignment
    #[error("Duplicate binding at {}..{}: {name}", span.start, span.end)]
    DuplicateBinding { name: String, span: Span },

    /// Excluded projection that orders by nothing, a wildcard where a
    /// value is needed, and similar projection shape errors
    #[error("Invalid projection at {}..{}: {message}", span.start, span.end)]
    InvalidProjection { message: String, span: Span },
}

impl ExprError {
    pub fn span(&self) -> Span {
        match self {
            ExprError::TypeMismatch { span, .. }
            | ExprError::UnresolvedName { span, .. }
            | ExprError::AggregationMisuse { span, .. }
            | ExprError::DuplicateBinding { span, .. }
            | ExprError::InvalidProjection { span, .. } => *span,
        }
    }
}
