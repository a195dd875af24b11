// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Builtin function appliers, one module per family.

pub mod aggregate;
pub mod plain;

use std::sync::Arc;

use relq_expr::{Expr, FrameMode, FrameSpec, FunctionApplier};

/// Template applier for a builtin name, or `None` for unknown names.
pub fn find(name: &str) -> Option<Arc<dyn FunctionApplier>> {
    match name {
        "coalesce" => Some(plain::coalesce()),
        "iif" => Some(plain::iif()),
        "random" => Some(plain::random()),
        "self" => Some(plain::self_fn()),
        "count" | "first" | "last" | "min" | "max" | "sum" | "avg" | "grn" => {
            Some(aggregate::template(name))
        }
        _ => None,
    }
}

/// Extract a window frame from the named arguments. `Ok(None)` when no
/// frame argument is present; `Err` with `reason` set on a malformed or
/// unknown named argument.
pub(crate) fn take_frame(
    fn_name: &str,
    named_args: &[(String, Expr)],
    reason: &mut Option<String>,
) -> Result<Option<FrameSpec>, ()> {
    let mut frame: Option<FrameSpec> = None;
    for (key, value) in named_args {
        let mode = match key.as_str() {
            "rows" => FrameMode::Rows,
            "groups" => FrameMode::Groups,
            "range" => FrameMode::Range,
            other => {
                *reason = Some(format!("{fn_name}: unknown named argument {other}"));
                return Err(());
            }
        };
        if frame.is_some() {
            *reason = Some(format!("{fn_name}: more than one frame argument"));
            return Err(());
        }
        let Expr::Range(range) = value else {
            *reason = Some(format!("{fn_name}: {key} requires a range value"));
            return Err(());
        };
        frame = Some(FrameSpec {
            mode,
            start: range.start.clone(),
            end: range.end.clone(),
        });
    }
    Ok(frame)
}

/// A frame whose constant endpoints enclose the current row can never
/// be empty; anything else may be.
pub(crate) fn frame_has_current(frame: &FrameSpec) -> bool {
    let at_or_before = |e: &Option<Expr>| match e {
        None => true,
        Some(Expr::Constant(c)) => matches!(
            c.value.compare(&relq_types::Value::Long(0)),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        Some(_) => false,
    };
    let at_or_after = |e: &Option<Expr>| match e {
        None => true,
        Some(Expr::Constant(c)) => matches!(
            c.value.compare(&relq_types::Value::Long(0)),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        Some(_) => false,
    };
    at_or_before(&frame.start) && at_or_after(&frame.end)
}
