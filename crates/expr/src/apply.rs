// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Function appliers
//!
//! A [`FunctionApplier`] is a validated function handle: the registry
//! resolves a call by name, the applier validates the arguments and
//! returns a refined instance carrying the resolved result type, and the
//! compiled operators drive it through one of three runtime contracts:
//!
//! - **Plain** appliers evaluate row-locally through [`ArgSource`], which
//!   pulls argument values lazily so conditional functions (`iif`,
//!   `coalesce`) evaluate only the branches they take.
//! - **Aggregated** appliers hand out one fresh [`Accumulator`] per
//!   group-by work slot.
//! - **Grouped** (window) appliers describe their computation as a
//!   [`WindowSpec`]; the window engine owns the sliding buffer and
//!   interprets that description over it.
//!
//! The applier itself is shared and immutable; per-scan state lives only
//! in accumulators and in the engine's window state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use relq_types::{EvalError, Type, Value};

use crate::expr::Expr;

/// The three runtime shapes of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplierKind {
    /// Row-local; one value per input row
    Plain,
    /// One value per group
    Aggregated,
    /// One value per row, computed over a window frame
    Grouped,
}

/// A validated function handle with a resolved result type
pub trait FunctionApplier: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ApplierKind;

    /// Resolved result type. Only meaningful on the refined applier
    /// returned by [`validate`](Self::validate).
    fn result_type(&self) -> Type;

    /// Pure functions are deterministic and side-effect free. Impure
    /// functions are never duplicated by filter normalization.
    fn is_pure(&self) -> bool {
        true
    }

    /// True when evaluation can never raise a runtime error; used to
    /// order short-circuit operands.
    fn never_throws(&self) -> bool {
        false
    }

    /// Validate a call site. Returns a refined applier carrying the
    /// resolved result type, or `None` with `reason` set.
    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>>;

    /// Row-local evaluation; only `Plain` appliers implement this.
    fn eval_plain(&self, _args: &mut dyn ArgSource) -> Result<Value, EvalError> {
        Err(EvalError::Unsupported(format!(
            "{} is not a row-local function",
            self.name()
        )))
    }

    /// Fresh per-group state; only `Aggregated` appliers implement this.
    fn new_accumulator(&self) -> Option<Box<dyn Accumulator>> {
        None
    }

    /// Window computation descriptor; only `Grouped` appliers implement
    /// this.
    fn window(&self) -> Option<&WindowSpec> {
        None
    }
}

/// Lazy positional argument access for plain function evaluation
pub trait ArgSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate and return the argument at `index`. May be called in any
    /// order; arguments not pulled are not evaluated.
    fn value(&mut self, index: usize) -> Result<Value, EvalError>;
}

/// Per-group accumulation state for an aggregated function.
///
/// The engine calls `begin` with the evaluated arguments of the first
/// row of a group, `accumulate` for each subsequent row, and `finish`
/// once to produce the group value. One accumulator instance serves one
/// scan of one group at a time; factories hand out fresh instances.
pub trait Accumulator: Send {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError>;

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError>;

    fn finish(&mut self) -> Result<Value, EvalError>;
}

/// Window frame modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameMode {
    /// Frame endpoints count physical rows
    Rows,
    /// Frame endpoints count groups of equal ordering values
    Groups,
    /// Frame endpoints offset the current row's ordering value
    Range,
}

/// A window frame: mode plus start/end endpoint expressions.
///
/// `None` endpoints are open. Endpoint expressions are compile-time
/// constants, argument-bound runtime constants, or per-row expressions;
/// the engine picks the cheapest buffering strategy that still covers
/// the endpoint shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub mode: FrameMode,
    pub start: Option<Expr>,
    pub end: Option<Expr>,
}

impl FrameSpec {
    /// True when both endpoints are compile-time constants.
    pub fn is_constant(&self) -> bool {
        self.start.as_ref().is_none_or(Expr::is_constant)
            && self.end.as_ref().is_none_or(Expr::is_constant)
    }
}

/// The frame computation of a grouped (window) function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowCompute {
    Count,
    Sum,
    Average,
    Min,
    Max,
    First,
    Last,
    /// 1-based position of the current row within its partition
    RowNumber,
}

/// Everything the window engine needs to run one grouped function
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub compute: WindowCompute,
    pub frame: FrameSpec,
    /// Result type of one frame computation
    pub result_type: Type,
    /// Value produced for an empty frame; `None` means the numeric
    /// identity of the computation is used
    pub empty_result: Option<Value>,
}

/// Name → applier lookup.
///
/// The parser and the aggregation/window transforms resolve calls
/// through this trait; the registry crate provides the standard
/// implementation.
pub trait FunctionFinder: Send + Sync {
    /// Find and validate an applier for a call site. Returns `None` and
    /// sets `reason` when the name is unknown or validation fails.
    fn try_find(
        &self,
        name: &str,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>>;
}
