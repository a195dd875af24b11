// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Query planning and compilation for relq.
//!
//! [`compile`] is the public entry point: query text in, a reusable
//! [`CompiledQuery`] out. The pipeline is parse → plan → intern: the
//! planned operator tree is canonicalized (literals become appended
//! arguments) and interned in a process-wide weak cache, so
//! structurally identical queries — including queries that differ only
//! in literal values — share one compiled artifact.

pub mod cache;
pub mod compiled;
pub mod error;
pub mod planner;
pub mod relation;

use relq_expr::FunctionFinder;
use relq_parse::parse_query;
use relq_store::TableRef;

// Re-exports for convenience
pub use compiled::{CompiledQuery, PlanArtifact};
pub use error::{PlanError, PlanResult};
pub use planner::{plan, PlannedQuery};
pub use relation::RelationExpr;

/// Compile a query against a base table.
pub fn compile(
    table: TableRef,
    finder: &dyn FunctionFinder,
    source: &str,
) -> PlanResult<CompiledQuery> {
    let parsed = parse_query(table.row_type(), finder, source)?;
    let planned = plan(table, &parsed, finder)?;
    let artifact = PlanArtifact::new(planned.root, planned.user_arg_count);
    let artifact = cache::intern(artifact);
    Ok(CompiledQuery::new(artifact, planned.extra_args))
}
