// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The aggregation engine
//!
//! [`QueryAggregator`] interprets an aggregated projection over the
//! [`TableAggregator`] protocol. At build time every aggregated call in
//! the projections and the group filter is lifted into a *work slot* —
//! a named accumulator fed by its argument expressions — and the
//! surrounding expressions are rewritten to reference the slot by
//! variable. At `finish` the slots resolve to values, assignments
//! evaluate eagerly (they may be referenced by later projections or by
//! the filter, and they may fail), the filter decides whether the group
//! survives, and the remaining projections fill the target row.

use std::collections::HashMap;
use std::sync::Arc;

use relq_types::{EvalError, Row, TupleType, Value};

use relq_expr::{Accumulator, ApplierKind, Expr, FunctionApplier, ProjExpr, VarExpr};
use relq_store::{AggregatorFactory, TableAggregator};

use crate::eval::{eval, eval_filter, EvalContext};

/// One aggregated call lifted out of the projections
#[derive(Debug, Clone)]
struct SlotSpec {
    name: String,
    applier: Arc<dyn FunctionApplier>,
    args: Vec<Expr>,
}

/// The compiled, shareable form of an aggregation operator.
///
/// Holds the rewritten projections and the slot table; per-scan state
/// lives in [`QueryAggregator`] instances the factory hands out. Query
/// arguments are captured here, so one compiled aggregate serves one
/// `table(args)` binding.
pub struct CompiledAggregate {
    source_type: Arc<TupleType>,
    target_type: Arc<TupleType>,
    slots: Vec<SlotSpec>,
    /// Target column name paired with its rewritten expression
    projections: Vec<(String, Expr)>,
    filter: Option<Expr>,
    args: Vec<Value>,
}

impl CompiledAggregate {
    /// Lift aggregated calls out of the projections and filter.
    ///
    /// The projections must already be aggregation-normalized (columns
    /// outside the group wrapped in `first`); the leading `group_by`
    /// projections are the partition columns and evaluate against the
    /// group's first row.
    pub fn build(
        source_type: Arc<TupleType>,
        target_type: Arc<TupleType>,
        projections: &[ProjExpr],
        filter: Option<&Expr>,
        args: Vec<Value>,
    ) -> Arc<CompiledAggregate> {
        let mut slots = Vec::new();
        let mut rewrite: HashMap<Expr, Expr> = HashMap::new();

        let mut lift = |expr: &Expr, slots: &mut Vec<SlotSpec>, rewrite: &mut HashMap<Expr, Expr>| {
            expr.visit(&mut |e| {
                if let Expr::Call(call) = e {
                    if call.applier.kind() == ApplierKind::Aggregated
                        && !rewrite.contains_key(e)
                    {
                        let name = format!("#a{}", slots.len());
                        slots.push(SlotSpec {
                            name: name.clone(),
                            applier: Arc::clone(&call.applier),
                            args: call.args.clone(),
                        });
                        rewrite.insert(
                            e.clone(),
                            Expr::Var(VarExpr {
                                span: call.span,
                                name,
                                ty: call.applier.result_type(),
                            }),
                        );
                    }
                }
            });
        };

        for proj in projections {
            lift(&proj.expr, &mut slots, &mut rewrite);
        }
        if let Some(filter) = filter {
            lift(filter, &mut slots, &mut rewrite);
        }

        let projections = projections
            .iter()
            .map(|p| (p.name.clone(), p.expr.replace(&rewrite)))
            .collect();
        let filter = filter.map(|f| f.replace(&rewrite));
        tracing::debug!(slots = slots.len(), "built aggregate operator");

        Arc::new(CompiledAggregate {
            source_type,
            target_type,
            slots,
            projections,
            filter,
            args,
        })
    }

    pub fn target_type(&self) -> &Arc<TupleType> {
        &self.target_type
    }

    /// The shared factory handed to the storage layer.
    pub fn factory(self: &Arc<Self>) -> Arc<QueryAggregatorFactory> {
        Arc::new(QueryAggregatorFactory {
            compiled: Arc::clone(self),
        })
    }
}

/// Shared aggregator factory; each scanner gets a fresh instance with
/// fresh accumulator state.
pub struct QueryAggregatorFactory {
    compiled: Arc<CompiledAggregate>,
}

impl AggregatorFactory for QueryAggregatorFactory {
    fn new_aggregator(&self) -> Box<dyn TableAggregator> {
        let compiled = Arc::clone(&self.compiled);
        let accumulators = compiled
            .slots
            .iter()
            .map(|s| s.applier.new_accumulator())
            .collect();
        Box::new(QueryAggregator {
            compiled,
            accumulators,
            first_row: None,
            row_num: 0,
            group_num: 0,
            group_row_num: 0,
        })
    }
}

/// Per-scan aggregation state: one accumulator per work slot plus the
/// three monotone counters.
pub struct QueryAggregator {
    compiled: Arc<CompiledAggregate>,
    accumulators: Vec<Option<Box<dyn Accumulator>>>,
    first_row: Option<Row>,
    row_num: u64,
    group_num: u64,
    group_row_num: u64,
}

impl QueryAggregator {
    fn feed(
        &mut self,
        row: &Row,
        begin: bool,
    ) -> Result<(), EvalError> {
        let compiled = &self.compiled;
        for (slot, acc) in compiled.slots.iter().zip(self.accumulators.iter_mut()) {
            let Some(acc) = acc else {
                return Err(EvalError::Unsupported(format!(
                    "{} produced no accumulator",
                    slot.applier.name()
                )));
            };
            let mut cx = EvalContext::new(row, &compiled.args);
            let mut values = Vec::with_capacity(slot.args.len());
            for arg in &slot.args {
                values.push(eval(arg, &mut cx)?);
            }
            if begin {
                acc.begin(&values)?;
            } else {
                acc.accumulate(&values)?;
            }
        }
        Ok(())
    }
}

impl TableAggregator for QueryAggregator {
    fn begin(&mut self, row: &Row) -> Result<(), EvalError> {
        self.row_num += 1;
        self.group_num += 1;
        self.group_row_num = 1;
        self.first_row = Some(row.clone());
        self.feed(row, true)
    }

    fn accumulate(&mut self, row: &Row) -> Result<(), EvalError> {
        self.row_num += 1;
        self.group_row_num += 1;
        self.feed(row, false)
    }

    fn finish(&mut self) -> Result<Option<Row>, EvalError> {
        let compiled = Arc::clone(&self.compiled);
        let first_row = self
            .first_row
            .take()
            .ok_or_else(|| EvalError::Unsupported("finish before begin".into()))?;

        let mut cx = EvalContext::new(&first_row, &compiled.args);
        for (slot, acc) in compiled.slots.iter().zip(self.accumulators.iter_mut()) {
            let acc = acc.as_mut().expect("checked in feed");
            cx.vars.insert(slot.name.clone(), acc.finish()?);
        }

        // Assignments evaluate before the filter: later projections and
        // the filter may reference them, and they may fail. This is
        // eager on purpose, even when the group is later filtered out.
        let mut assigned: HashMap<&str, Value> = HashMap::new();
        for (name, expr) in &compiled.projections {
            if matches!(expr, Expr::Assign(_)) {
                assigned.insert(name.as_str(), eval(expr, &mut cx)?);
            }
        }

        if let Some(filter) = &compiled.filter {
            if !eval_filter(filter, &mut cx)? {
                return Ok(None);
            }
        }

        let mut target = Row::null_row(Arc::clone(&compiled.target_type));
        for (name, expr) in &compiled.projections {
            let value = match assigned.remove(name.as_str()) {
                Some(v) => v,
                None => eval(expr, &mut cx)?,
            };
            let index = compiled
                .target_type
                .index_of(name)
                .ok_or_else(|| EvalError::Unsupported(format!("no target column {name}")))?;
            let column = compiled.target_type.column(index);
            if value.is_null() && !column.ty.is_nullable() {
                return Err(EvalError::NullNotAllowed(name.clone()));
            }
            let value = value.convert(&column.ty)?;
            target.set(index, value);
        }
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_expr::Span;
    use relq_types::{Column, Primitive, Type};

    // Accumulator stubs keep this module's tests independent of the
    // registry crate; the real appliers live there.
    #[derive(Debug)]
    struct SumApplier;

    impl FunctionApplier for SumApplier {
        fn name(&self) -> &str {
            "sum"
        }
        fn kind(&self) -> ApplierKind {
            ApplierKind::Aggregated
        }
        fn result_type(&self) -> Type {
            Type::basic_nullable(Primitive::Double)
        }
        fn validate(
            &self,
            _args: &[Expr],
            _named: &[(String, Expr)],
            _reason: &mut Option<String>,
        ) -> Option<Arc<dyn FunctionApplier>> {
            Some(Arc::new(SumApplier))
        }
        fn new_accumulator(&self) -> Option<Box<dyn Accumulator>> {
            Some(Box::new(SumAcc { total: Value::Null }))
        }
    }

    struct SumAcc {
        total: Value,
    }

    impl Accumulator for SumAcc {
        fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
            self.total = Value::Null;
            self.accumulate(args)
        }
        fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
            if !args[0].is_null() {
                self.total = if self.total.is_null() {
                    args[0].clone()
                } else {
                    relq_types::arith::apply(relq_types::arith::ArithOp::Add, &self.total, &args[0])?
                };
            }
            Ok(())
        }
        fn finish(&mut self) -> Result<Value, EvalError> {
            Ok(self.total.clone())
        }
    }

    struct Finder;

    impl relq_expr::FunctionFinder for Finder {
        fn try_find(
            &self,
            name: &str,
            _args: &[Expr],
            _named: &[(String, Expr)],
            _reason: &mut Option<String>,
        ) -> Option<Arc<dyn FunctionApplier>> {
            (name == "sum").then(|| Arc::new(SumApplier) as Arc<dyn FunctionApplier>)
        }
    }

    fn source_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("dept", Type::basic(Primitive::Text)),
            Column::new("salary", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    fn target_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("dept", Type::basic(Primitive::Text)),
            Column::new("total", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    fn row(dept: &str, salary: Option<f64>) -> Row {
        Row::new(
            source_type(),
            vec![
                Value::Text(dept.into()),
                salary.map(Value::Double).unwrap_or(Value::Null),
            ],
        )
        .unwrap()
    }

    fn build() -> Arc<CompiledAggregate> {
        let span = Span::default();
        let dept = Expr::Column(
            relq_expr::ColumnExpr::resolve(span, source_type(), vec!["dept".into()]).unwrap(),
        );
        let salary = Expr::Column(
            relq_expr::ColumnExpr::resolve(span, source_type(), vec!["salary".into()]).unwrap(),
        );
        let sum = relq_expr::CallExpr::make(span, "sum".into(), vec![salary], vec![], &Finder)
            .unwrap();
        let projections = vec![
            ProjExpr::make(span, "dept".into(), Default::default(), dept).unwrap(),
            ProjExpr::make(span, "total".into(), Default::default(), sum).unwrap(),
        ];
        CompiledAggregate::build(source_type(), target_type(), &projections, None, vec![])
    }

    #[test]
    fn test_group_sum_with_nulls() {
        let compiled = build();
        let mut agg = compiled.factory().new_aggregator();
        agg.begin(&row("x", Some(10.0))).unwrap();
        agg.accumulate(&row("x", None)).unwrap();
        let out = agg.finish().unwrap().unwrap();
        assert_eq!(out.get_named("dept"), Some(&Value::Text("x".into())));
        assert_eq!(out.get_named("total"), Some(&Value::Double(10.0)));
    }

    #[test]
    fn test_all_null_group_sums_to_null() {
        let compiled = build();
        let mut agg = compiled.factory().new_aggregator();
        agg.begin(&row("y", None)).unwrap();
        let out = agg.finish().unwrap().unwrap();
        assert_eq!(out.get_named("total"), Some(&Value::Null));
    }

    #[test]
    fn test_fresh_state_per_instance() {
        let compiled = build();
        let mut a = compiled.factory().new_aggregator();
        let mut b = compiled.factory().new_aggregator();
        a.begin(&row("x", Some(1.0))).unwrap();
        b.begin(&row("x", Some(100.0))).unwrap();
        assert_eq!(
            a.finish().unwrap().unwrap().get_named("total"),
            Some(&Value::Double(1.0))
        );
        assert_eq!(
            b.finish().unwrap().unwrap().get_named("total"),
            Some(&Value::Double(100.0))
        );
    }
}
