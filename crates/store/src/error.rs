// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details
//
//! # Error types for the storage interface

use thiserror::Error;

use relq_types::{EvalError, TypeError};

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors crossing the storage interface
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The table or view does not support writes
    #[error("Table is read-only: {0}")]
    ReadOnly(String),

    /// The table does not implement the requested operation
    #[error("Unsupported table operation: {0}")]
    Unsupported(String),

    /// A column named by a query string is not part of the row type
    #[error("Unknown column in storage query: {0}")]
    UnknownColumn(String),

    /// Too few arguments for the view or scan
    #[error("Query requires {required} arguments, got {supplied}")]
    ArgumentCount { required: usize, supplied: usize },

    /// A row-level evaluation error surfaced while scanning
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// A schema-level error surfaced while scanning
    #[error(transparent)]
    Type(#[from] TypeError),
}
