// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Query plan explanations.
//!
//! A [`QueryPlan`] describes the shape of a compiled scan as a tree of
//! operator nodes, for diagnostics and tests. It carries no executable
//! state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One node of a plan explanation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryPlan {
    /// Full scan of a base table
    Scan { table: String },
    /// Native storage-side filter/projection/order
    View {
        query: String,
        source: Box<QueryPlan>,
    },
    /// Row-by-row mapper running in the compiler's operators
    Map {
        filter: Option<String>,
        projection: Vec<String>,
        source: Box<QueryPlan>,
    },
    /// Grouped aggregation
    Aggregate {
        group_by: Vec<String>,
        source: Box<QueryPlan>,
    },
    /// Window grouping
    Group {
        partition: Vec<String>,
        order: Vec<String>,
        source: Box<QueryPlan>,
    },
    /// Materializing sort
    Sort {
        order: Vec<String>,
        source: Box<QueryPlan>,
    },
}

impl QueryPlan {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            QueryPlan::Scan { table } => writeln!(f, "{pad}- scan: {table}"),
            QueryPlan::View { query, source } => {
                writeln!(f, "{pad}- view: {query}")?;
                source.fmt_indented(f, depth + 1)
            }
            QueryPlan::Map {
                filter,
                projection,
                source,
            } => {
                write!(f, "{pad}- map: {{{}}}", projection.join(", "))?;
                if let Some(filter) = filter {
                    write!(f, " {filter}")?;
                }
                writeln!(f)?;
                source.fmt_indented(f, depth + 1)
            }
            QueryPlan::Aggregate { group_by, source } => {
                writeln!(f, "{pad}- aggregate by: [{}]", group_by.join(", "))?;
                source.fmt_indented(f, depth + 1)
            }
            QueryPlan::Group {
                partition,
                order,
                source,
            } => {
                writeln!(
                    f,
                    "{pad}- group by: [{}] order: [{}]",
                    partition.join(", "),
                    order.join(", ")
                )?;
                source.fmt_indented(f, depth + 1)
            }
            QueryPlan::Sort { order, source } => {
                writeln!(f, "{pad}- sort: [{}]", order.join(", "))?;
                source.fmt_indented(f, depth + 1)
            }
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let plan = QueryPlan::Map {
            filter: Some("a > ?1".into()),
            projection: vec!["a".into(), "b".into()],
            source: Box::new(QueryPlan::View {
                query: "{a, b} c == ?2".into(),
                source: Box::new(QueryPlan::Scan {
                    table: "rows".into(),
                }),
            }),
        };
        let text = plan.to_string();
        assert!(text.contains("- map: {a, b} a > ?1"));
        assert!(text.contains("  - view: {a, b} c == ?2"));
        assert!(text.contains("    - scan: rows"));
    }

    #[test]
    fn test_serialization() {
        let plan = QueryPlan::Scan {
            table: "rows".into(),
        };
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("rows"));
    }
}
