// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Parse errors
//!
//! Every parse error carries the source span it was raised at; errors
//! from expression construction pass through with their own spans.

use thiserror::Error;

use relq_expr::{ExprError, Span};

/// Result type alias for parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while tokenizing or parsing query text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unexpected token or missing delimiter
    #[error("Syntax error at {}..{}: {message}", span.start, span.end)]
    Syntax { message: String, span: Span },

    /// Malformed literal
    #[error("Bad literal at {}..{}: {message}", span.start, span.end)]
    BadLiteral { message: String, span: Span },

    /// Explicit parameter ordinal out of the 1..=100 window
    #[error("Parameter ?{ordinal} out of range at {}..{}: ordinals are 1..=100", span.start, span.end)]
    ParameterBounds { ordinal: u64, span: Span },

    /// Expression-level error raised during construction
    #[error(transparent)]
    Expr(#[from] ExprError),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Syntax { span, .. }
            | ParseError::BadLiteral { span, .. }
            | ParseError::ParameterBounds { span, .. } => *span,
            ParseError::Expr(e) => e.span(),
        }
    }
}
