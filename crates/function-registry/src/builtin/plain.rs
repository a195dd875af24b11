// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Row-local builtins
//!
//! `coalesce` and `iif` are lazy: they pull only the arguments the row
//! actually needs, so an untaken branch never evaluates. `random` is
//! the one impure builtin; `self` is the identity passthrough.

use std::sync::Arc;

use relq_types::{EvalError, OpCategory, Primitive, Type, Value};

use relq_expr::{ApplierKind, ArgSource, Expr, FunctionApplier};

pub fn coalesce() -> Arc<dyn FunctionApplier> {
    Arc::new(Coalesce { result: Type::Any })
}

pub fn iif() -> Arc<dyn FunctionApplier> {
    Arc::new(Iif { result: Type::Any })
}

pub fn random() -> Arc<dyn FunctionApplier> {
    Arc::new(Random)
}

pub fn self_fn() -> Arc<dyn FunctionApplier> {
    Arc::new(SelfFn { result: Type::Any })
}

/// First non-null argument
#[derive(Debug)]
struct Coalesce {
    result: Type,
}

impl FunctionApplier for Coalesce {
    fn name(&self) -> &str {
        "coalesce"
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Plain
    }

    fn result_type(&self) -> Type {
        self.result.clone()
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        if args.is_empty() {
            *reason = Some("coalesce requires at least one argument".into());
            return None;
        }
        if !named_args.is_empty() {
            *reason = Some("coalesce takes no named arguments".into());
            return None;
        }
        let mut result = args[0].ty();
        for arg in &args[1..] {
            match result.common_type(&arg.ty(), OpCategory::Comparison) {
                Some(common) => result = common,
                None => {
                    *reason = Some(format!(
                        "coalesce arguments do not share a type: {} and {}",
                        result,
                        arg.ty()
                    ));
                    return None;
                }
            }
        }
        // The result is null only when every argument is null.
        if args.iter().any(|a| !a.is_nullable()) {
            result = result.non_nullable();
        }
        Some(Arc::new(Coalesce { result }))
    }

    fn eval_plain(&self, args: &mut dyn ArgSource) -> Result<Value, EvalError> {
        for i in 0..args.len() {
            let v = args.value(i)?;
            if !v.is_null() {
                return v.convert(&self.result).map_err(EvalError::from);
            }
        }
        Ok(Value::Null)
    }
}

/// `iif(condition, then, else)` with lazy branches
#[derive(Debug)]
struct Iif {
    result: Type,
}

impl FunctionApplier for Iif {
    fn name(&self) -> &str {
        "iif"
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Plain
    }

    fn result_type(&self) -> Type {
        self.result.clone()
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        if args.len() != 3 || !named_args.is_empty() {
            *reason = Some("iif requires exactly (condition, then, else)".into());
            return None;
        }
        if !args[0].ty().is_boolean() {
            *reason = Some(format!(
                "iif condition must be boolean, found {}",
                args[0].ty()
            ));
            return None;
        }
        match args[1].ty().common_type(&args[2].ty(), OpCategory::Comparison) {
            Some(result) => Some(Arc::new(Iif { result })),
            None => {
                *reason = Some(format!(
                    "iif branches do not share a type: {} and {}",
                    args[1].ty(),
                    args[2].ty()
                ));
                None
            }
        }
    }

    fn eval_plain(&self, args: &mut dyn ArgSource) -> Result<Value, EvalError> {
        // A null condition takes the else branch.
        let taken = match args.value(0)? {
            Value::Boolean(true) => 1,
            _ => 2,
        };
        args.value(taken)?.convert(&self.result).map_err(EvalError::from)
    }
}

/// Uniform double in `[0, 1)`; the one impure builtin
#[derive(Debug)]
struct Random;

impl FunctionApplier for Random {
    fn name(&self) -> &str {
        "random"
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Plain
    }

    fn result_type(&self) -> Type {
        Type::basic(Primitive::Double)
    }

    fn is_pure(&self) -> bool {
        false
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        if !args.is_empty() || !named_args.is_empty() {
            *reason = Some("random takes no arguments".into());
            return None;
        }
        Some(Arc::new(Random))
    }

    fn eval_plain(&self, _args: &mut dyn ArgSource) -> Result<Value, EvalError> {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| EvalError::Unsupported(format!("random source failed: {e}")))?;
        let bits = u64::from_le_bytes(bytes);
        // 53 uniform mantissa bits.
        Ok(Value::Double((bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)))
    }
}

/// Identity passthrough
#[derive(Debug)]
struct SelfFn {
    result: Type,
}

impl FunctionApplier for SelfFn {
    fn name(&self) -> &str {
        "self"
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Plain
    }

    fn result_type(&self) -> Type {
        self.result.clone()
    }

    fn never_throws(&self) -> bool {
        true
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        if args.len() != 1 || !named_args.is_empty() {
            *reason = Some("self requires exactly one argument".into());
            return None;
        }
        Some(Arc::new(SelfFn {
            result: args[0].ty(),
        }))
    }

    fn eval_plain(&self, args: &mut dyn ArgSource) -> Result<Value, EvalError> {
        args.value(0)
    }
}
