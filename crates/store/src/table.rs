// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The storage interface
//!
//! The query compiler treats the physical storage engine as an external
//! collaborator behind the [`Table`] trait: a typed row source that can
//! natively filter, project and order through [`Table::view`], and that
//! accepts generated aggregator and grouper factories.
//!
//! ## The view query-string contract
//!
//! `view(query, args)` receives a query in the compiler's own surface
//! syntax, with projections and ordering in braces and parameters
//! numbered explicitly:
//!
//! ```text
//! {col1, +col2, -col3, ~hiddenCol} col4 == ?1 && col5 > ?2
//! ```
//!
//! The string never contains literal constants for pushed filters — the
//! planner canonicalizes literals into appended arguments so that
//! structurally identical queries share compiled artifacts.
//!
//! ## Concurrency
//!
//! Tables and factories are shared (`Send + Sync`); scanners, updaters
//! and the operator instances factories hand out are per-scan state and
//! must not be shared.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use relq_types::{Row, TupleType, Value};

use crate::error::{StoreError, StoreResult};
use crate::plan::QueryPlan;

/// Shared handle to a table
pub type TableRef = Arc<dyn Table>;

/// One ordering term of a sorted view or group specification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: String,
    pub descending: bool,
    /// Nulls order low instead of high
    pub null_low: bool,
}

impl OrderTerm {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
            null_low: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
            null_low: false,
        }
    }

    /// Render in the view-string ordering syntax: `+a`, `-b`, `+!c`.
    pub fn printed(&self) -> String {
        let mut s = String::new();
        s.push(if self.descending { '-' } else { '+' });
        if self.null_low {
            s.push('!');
        }
        s.push_str(&relq_types::escape_name(&self.column));
        s
    }
}

/// A typed row source
pub trait Table: Send + Sync {
    /// The row shape this table produces.
    fn row_type(&self) -> Arc<TupleType>;

    /// A fresh scanner over the table's rows.
    fn new_scanner(&self, args: &[Value]) -> StoreResult<Box<dyn Scanner>>;

    /// A fresh updater positioned before the first row. Views and
    /// derived tables are read-only and refuse.
    fn new_updater(&self, _args: &[Value]) -> StoreResult<Box<dyn Updater>> {
        Err(StoreError::ReadOnly(self.describe()))
    }

    /// A natively filtered/projected/ordered view of this table. The
    /// query string follows the view contract described at module
    /// level.
    fn view(&self, query: &str, args: &[Value]) -> StoreResult<TableRef>;

    /// Explanation of a plain scan of this table.
    fn scan_plan(&self) -> QueryPlan;

    /// Short human-readable identity for diagnostics.
    fn describe(&self) -> String;
}

/// Pull-based row cursor
pub trait Scanner {
    /// The next row, or `None` at the end of the sequence.
    fn step(&mut self) -> StoreResult<Option<Row>>;
}

/// A scanner that can mutate the row it last returned
pub trait Updater: Scanner {
    /// Replace the current row.
    fn update(&mut self, row: Row) -> StoreResult<()>;

    /// Delete the current row.
    fn delete(&mut self) -> StoreResult<()>;
}

/// Scanner over an in-memory row vector; the common terminal case for
/// derived tables that materialize.
pub struct VecScanner {
    rows: std::vec::IntoIter<Row>,
}

impl VecScanner {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Scanner for VecScanner {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_term_rendering() {
        assert_eq!(OrderTerm::ascending("a").printed(), "+a");
        assert_eq!(OrderTerm::descending("b").printed(), "-b");
        let t = OrderTerm {
            column: "c".into(),
            descending: false,
            null_low: true,
        };
        assert_eq!(t.printed(), "+!c");
    }
}
