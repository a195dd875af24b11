// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Aggregation protocol and driver
//!
//! A [`TableAggregator`] is the per-scan state machine the compiler
//! generates for a grouped aggregation; [`AggregatedTable`] drives it
//! over a source table, detecting group boundaries by equality of the
//! leading group-by columns. Source order is preserved: groups emit in
//! first-row order, and rows within a group accumulate in source order.

use std::sync::Arc;

use relq_types::{EvalError, Row, TupleType, Value};

use crate::error::StoreResult;
use crate::plan::QueryPlan;
use crate::table::{Scanner, Table, TableRef};

/// Per-scan aggregation state machine
pub trait TableAggregator: Send {
    /// Start a new group with its first row.
    fn begin(&mut self, row: &Row) -> Result<(), EvalError>;

    /// Fold one more row into the current group. Every row of a group
    /// is accepted; rows are rejected before aggregation by the row
    /// filter, and whole groups afterwards by `finish`.
    fn accumulate(&mut self, row: &Row) -> Result<(), EvalError>;

    /// Emit the aggregated row for the current group, or `None` when
    /// the group filter rejects it.
    fn finish(&mut self) -> Result<Option<Row>, EvalError>;
}

/// Shared factory handing out fresh aggregator instances, one per scan
pub trait AggregatorFactory: Send + Sync {
    fn new_aggregator(&self) -> Box<dyn TableAggregator>;
}

/// Aggregate a source table. Grouping is by equality of the named
/// leading columns; an empty list aggregates everything into a single
/// group.
pub fn aggregate(
    source: TableRef,
    group_by: &[String],
    target: Arc<TupleType>,
    factory: Arc<dyn AggregatorFactory>,
) -> TableRef {
    Arc::new(AggregatedTable {
        source,
        group_by: group_by.to_vec(),
        target,
        factory,
    })
}

/// A table producing one row per group of its source
pub struct AggregatedTable {
    source: TableRef,
    group_by: Vec<String>,
    target: Arc<TupleType>,
    factory: Arc<dyn AggregatorFactory>,
}

impl Table for AggregatedTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.target)
    }

    fn new_scanner(&self, args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        let source = self.source.new_scanner(args)?;
        let row_type = self.source.row_type();
        let key_indexes = self
            .group_by
            .iter()
            .map(|name| {
                row_type
                    .index_of(name)
                    .ok_or_else(|| crate::error::StoreError::UnknownColumn(name.clone()))
            })
            .collect::<StoreResult<Vec<usize>>>()?;
        Ok(Box::new(AggregatedScanner {
            source,
            aggregator: self.factory.new_aggregator(),
            key_indexes,
            pending: None,
            in_group: false,
            done: false,
        }))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(crate::error::StoreError::Unsupported(format!(
            "aggregated table cannot view {query:?} natively"
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Aggregate {
            group_by: self.group_by.clone(),
            source: Box::new(self.source.scan_plan()),
        }
    }

    fn describe(&self) -> String {
        format!("aggregate({})", self.source.describe())
    }
}

struct AggregatedScanner {
    source: Box<dyn Scanner>,
    aggregator: Box<dyn TableAggregator>,
    key_indexes: Vec<usize>,
    /// First row of the next group, read past the current boundary
    pending: Option<Row>,
    in_group: bool,
    done: bool,
}

impl AggregatedScanner {
    fn same_group(&self, a: &Row, b: &Row) -> bool {
        self.key_indexes
            .iter()
            .all(|&i| a.get(i) == b.get(i))
    }
}

impl Scanner for AggregatedScanner {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if !self.in_group {
                let first = match self.pending.take() {
                    Some(row) => Some(row),
                    None => self.source.step()?,
                };
                let Some(first) = first else {
                    self.done = true;
                    return Ok(None);
                };
                self.aggregator.begin(&first)?;
                self.pending = Some(first);
                self.in_group = true;
            }
            // `pending` holds the most recent row of the current group.
            let current = self.pending.take().expect("group in progress");
            loop {
                match self.source.step()? {
                    Some(next) if self.same_group(&current, &next) => {
                        self.aggregator.accumulate(&next)?;
                    }
                    Some(next) => {
                        // Boundary: emit the group, stage the next one.
                        let emitted = self.aggregator.finish()?;
                        self.pending = Some(next);
                        self.in_group = false;
                        match emitted {
                            Some(row) => return Ok(Some(row)),
                            None => break,
                        }
                    }
                    None => {
                        let emitted = self.aggregator.finish()?;
                        self.done = true;
                        return Ok(emitted);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::VecScanner;
    use relq_types::{Column, Primitive, Type};

    fn schema() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("dept", Type::basic(Primitive::Text)),
            Column::new("n", Type::basic(Primitive::Long)),
        ])
        .unwrap()
    }

    fn row(dept: &str, n: i64) -> Row {
        Row::new(schema(), vec![Value::Text(dept.into()), Value::Long(n)]).unwrap()
    }

    struct FixedTable(Vec<Row>);

    impl Table for FixedTable {
        fn row_type(&self) -> Arc<TupleType> {
            schema()
        }
        fn new_scanner(&self, _args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
            Ok(Box::new(VecScanner::new(self.0.clone())))
        }
        fn view(&self, _q: &str, _a: &[Value]) -> StoreResult<TableRef> {
            unimplemented!()
        }
        fn scan_plan(&self) -> QueryPlan {
            QueryPlan::Scan {
                table: "fixed".into(),
            }
        }
        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    /// Sums the `n` column per group.
    struct SumAgg {
        key: Option<Value>,
        total: i64,
    }

    impl TableAggregator for SumAgg {
        fn begin(&mut self, row: &Row) -> Result<(), EvalError> {
            self.key = Some(row.get(0).clone());
            self.total = match row.get(1) {
                Value::Long(n) => *n,
                _ => 0,
            };
            Ok(())
        }
        fn accumulate(&mut self, row: &Row) -> Result<(), EvalError> {
            if let Value::Long(n) = row.get(1) {
                self.total += n;
            }
            Ok(())
        }
        fn finish(&mut self) -> Result<Option<Row>, EvalError> {
            let key = self.key.take().expect("group started");
            Ok(Some(
                Row::new(schema(), vec![key, Value::Long(self.total)]).unwrap(),
            ))
        }
    }

    struct SumFactory;

    impl AggregatorFactory for SumFactory {
        fn new_aggregator(&self) -> Box<dyn TableAggregator> {
            Box::new(SumAgg {
                key: None,
                total: 0,
            })
        }
    }

    #[test]
    fn test_group_boundaries_and_order() {
        let source: TableRef = Arc::new(FixedTable(vec![
            row("x", 1),
            row("x", 2),
            row("y", 10),
            row("x", 5),
        ]));
        let table = aggregate(
            source,
            &["dept".to_string()],
            schema(),
            Arc::new(SumFactory),
        );
        let mut scanner = table.new_scanner(&[]).unwrap();
        let mut out = Vec::new();
        while let Some(r) = scanner.step().unwrap() {
            out.push((r.get(0).clone(), r.get(1).clone()));
        }
        // Adjacent runs group; order of first appearance is preserved.
        assert_eq!(
            out,
            vec![
                (Value::Text("x".into()), Value::Long(3)),
                (Value::Text("y".into()), Value::Long(10)),
                (Value::Text("x".into()), Value::Long(5)),
            ]
        );
    }

    #[test]
    fn test_single_group_aggregation() {
        let source: TableRef = Arc::new(FixedTable(vec![row("x", 1), row("y", 2)]));
        let table = aggregate(source, &[], schema(), Arc::new(SumFactory));
        let mut scanner = table.new_scanner(&[]).unwrap();
        let r = scanner.step().unwrap().unwrap();
        assert_eq!(r.get(1), &Value::Long(3));
        assert!(scanner.step().unwrap().is_none());
    }

    #[test]
    fn test_empty_source() {
        let source: TableRef = Arc::new(FixedTable(vec![]));
        let table = aggregate(
            source,
            &["dept".to_string()],
            schema(),
            Arc::new(SumFactory),
        );
        let mut scanner = table.new_scanner(&[]).unwrap();
        assert!(scanner.step().unwrap().is_none());
    }
}
