// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Expression AST for relq.
//!
//! The closed node family the parser produces and the planner consumes,
//! together with:
//!
//! - the rewrite pipeline of [`expr::BinaryExpr::make`]
//! - the aggregation and window normalization transforms
//! - the [`filter::RowFilter`] bridge used for pushdown splitting
//! - the canonical [`key::KeyEncoder`] cache-key encoding
//! - the [`apply`] traits connecting calls to the function registry and
//!   the runtime engines

pub mod apply;
mod binary;
mod display;
pub mod error;
pub mod expr;
pub mod filter;
pub mod key;
pub mod span;
mod transform;

// Re-exports for convenience
pub use apply::{
    Accumulator, ApplierKind, ArgSource, FrameMode, FrameSpec, FunctionApplier, FunctionFinder,
    WindowCompute, WindowSpec,
};
pub use error::{ExprError, ExprResult};
pub use expr::{
    AssignExpr, BinaryExpr, BinaryOp, CallExpr, ColumnExpr, ConstantExpr, ConversionExpr, Expr,
    InExpr, NotExpr, ParamExpr, ProjExpr, ProjFlags, RangeExpr, VarExpr,
};
pub use filter::RowFilter;
pub use key::KeyEncoder;
pub use span::Span;
pub use transform::WindowAssignments;
