// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Runtime engines for relq.
//!
//! Compiled operators are interpreted: one tree-walking [`eval`]
//! evaluator serves the mapper, aggregation and window layers.
//!
//! - [`eval`] — per-row expression evaluation
//! - [`buffer`] — the sliding `ValueBuffer`/`WindowBuffer` pair
//! - [`aggregate`] — the `init/begin/accumulate/finish` engine
//! - [`window`] — the `begin/accumulate/finished/check/step` engine

pub mod aggregate;
pub mod buffer;
pub mod eval;
pub mod window;

// Re-exports for convenience
pub use aggregate::{CompiledAggregate, QueryAggregator, QueryAggregatorFactory};
pub use buffer::{ValueBuffer, WindowBuffer, DEFAULT_CAPACITY};
pub use eval::{eval, eval_filter, EvalContext};
pub use window::{CompiledGroup, QueryGrouper, QueryGrouperFactory};
