// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The standard function finder
//!
//! Maps call names to builtin applier templates and validates call
//! sites against them. Lookups are cached by name, including a negative
//! sentinel for unknown names so repeated misses stay cheap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relq_expr::{Expr, FunctionApplier, FunctionFinder};

use crate::builtin;

/// The builtin [`FunctionFinder`] implementation
#[derive(Default)]
pub struct StandardFunctionFinder {
    /// Name → template applier; `None` is the negative sentinel
    cache: Mutex<HashMap<String, Option<Arc<dyn FunctionApplier>>>>,
}

impl StandardFunctionFinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn FunctionApplier>> {
        let key = name.to_ascii_lowercase();
        let mut cache = self.cache.lock().expect("finder cache");
        cache
            .entry(key)
            .or_insert_with_key(|key| builtin::find(key))
            .clone()
    }
}

impl FunctionFinder for StandardFunctionFinder {
    fn try_find(
        &self,
        name: &str,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        match self.lookup(name) {
            Some(template) => template.validate(args, named_args, reason),
            None => {
                *reason = Some(format!("no such function: {name}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_expr::{ApplierKind, ConstantExpr, Span};
    use relq_types::Value;

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let finder = StandardFunctionFinder::new();
        let mut reason = None;
        assert!(finder.try_find("COUNT", &[], &[], &mut reason).is_some());
        assert!(finder.try_find("count", &[], &[], &mut reason).is_some());
    }

    #[test]
    fn test_negative_cache() {
        let finder = StandardFunctionFinder::new();
        let mut reason = None;
        assert!(finder.try_find("nope", &[], &[], &mut reason).is_none());
        assert_eq!(reason.as_deref(), Some("no such function: nope"));
        // Second miss hits the sentinel.
        let mut reason = None;
        assert!(finder.try_find("nope", &[], &[], &mut reason).is_none());
        assert!(reason.is_some());
    }

    #[test]
    fn test_validation_refines() {
        let finder = StandardFunctionFinder::new();
        let mut reason = None;
        let applier = finder
            .try_find("sum", &[constant(Value::Int(1))], &[], &mut reason)
            .unwrap();
        assert_eq!(applier.kind(), ApplierKind::Aggregated);
        assert_eq!(
            applier.result_type(),
            relq_types::Type::basic(relq_types::Primitive::Long)
        );
    }

    #[test]
    fn test_validation_failure_reason() {
        let finder = StandardFunctionFinder::new();
        let mut reason = None;
        assert!(finder.try_find("sum", &[], &[], &mut reason).is_none());
        assert!(reason.unwrap().contains("sum"));
    }
}
