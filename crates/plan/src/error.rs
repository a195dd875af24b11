// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Planning and execution-surface errors

use thiserror::Error;

use relq_expr::ExprError;
use relq_parse::ParseError;
use relq_store::StoreError;
use relq_types::TypeError;

/// Result type alias for planning
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised while planning or binding a compiled query
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// Too few arguments supplied to `table(args)`
    #[error("Query requires {required} arguments, got {supplied}")]
    ArgumentCount { required: usize, supplied: usize },

    /// Writes through a derived (mapped, aggregated or grouped) layer
    #[error("Query result is not updatable: {0}")]
    ReadOnlyView(String),

    /// A window frame needs an upstream ordering the query lacks
    #[error("Window frame mode requires an ordered column: {0}")]
    UnorderedWindow(String),
}
