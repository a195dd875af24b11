// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Window grouping protocol and driver
//!
//! A [`TableGrouper`] emits one output row per input row, delayed by
//! however much lookahead the window frames need. [`GroupedTable`]
//! drives it: partitions are runs of equal partition-column values, and
//! after every input row the driver drains whatever the grouper reports
//! ready. At a partition boundary and at end of input the grouper is
//! told the input finished and drained completely.

use std::sync::Arc;

use relq_types::{EvalError, Row, TupleType, Value};

use crate::error::StoreResult;
use crate::plan::QueryPlan;
use crate::table::{OrderTerm, Scanner, Table, TableRef};

/// Per-scan window state machine
pub trait TableGrouper: Send {
    /// Start a new partition with its first row.
    fn begin(&mut self, row: &Row) -> Result<(), EvalError>;

    /// Buffer one more row of the current partition.
    fn accumulate(&mut self, row: &Row) -> Result<(), EvalError>;

    /// The current partition's input is exhausted.
    fn finished(&mut self);

    /// True when a call to [`step`](Self::step) can produce a row now.
    /// Before `finished`, false means more input is needed; after, it
    /// means the partition is fully drained. May grow internal
    /// lookahead state.
    fn check(&mut self) -> Result<bool, EvalError>;

    /// Produce the next output row.
    fn step(&mut self) -> Result<Row, EvalError>;
}

/// Shared factory handing out fresh grouper instances, one per scan
pub trait GrouperFactory: Send + Sync {
    fn new_grouper(&self) -> Box<dyn TableGrouper>;
}

/// Window a source table over partitions of the named columns, with the
/// given intra-partition ordering already established upstream.
pub fn group(
    source: TableRef,
    partition: &[String],
    order: &[OrderTerm],
    target: Arc<TupleType>,
    factory: Arc<dyn GrouperFactory>,
) -> TableRef {
    Arc::new(GroupedTable {
        source,
        partition: partition.to_vec(),
        order: order.to_vec(),
        target,
        factory,
    })
}

/// A table windowing its source one partition at a time
pub struct GroupedTable {
    source: TableRef,
    partition: Vec<String>,
    order: Vec<OrderTerm>,
    target: Arc<TupleType>,
    factory: Arc<dyn GrouperFactory>,
}

impl Table for GroupedTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.target)
    }

    fn new_scanner(&self, args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        let source = self.source.new_scanner(args)?;
        let row_type = self.source.row_type();
        let key_indexes = self
            .partition
            .iter()
            .map(|name| {
                row_type
                    .index_of(name)
                    .ok_or_else(|| crate::error::StoreError::UnknownColumn(name.clone()))
            })
            .collect::<StoreResult<Vec<usize>>>()?;
        Ok(Box::new(GroupedScanner {
            source,
            grouper: self.factory.new_grouper(),
            key_indexes,
            head: None,
            pending: None,
            in_partition: false,
            source_done: false,
        }))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(crate::error::StoreError::Unsupported(format!(
            "grouped table cannot view {query:?} natively"
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Group {
            partition: self.partition.clone(),
            order: self.order.iter().map(OrderTerm::printed).collect(),
            source: Box::new(self.source.scan_plan()),
        }
    }

    fn describe(&self) -> String {
        format!("group({})", self.source.describe())
    }
}

struct GroupedScanner {
    source: Box<dyn Scanner>,
    grouper: Box<dyn TableGrouper>,
    key_indexes: Vec<usize>,
    /// First row of the current partition, for boundary comparison
    head: Option<Row>,
    /// First row of the next partition, read past the boundary
    pending: Option<Row>,
    in_partition: bool,
    source_done: bool,
}

impl GroupedScanner {
    fn same_partition(&self, a: &Row, b: &Row) -> bool {
        self.key_indexes.iter().all(|&i| a.get(i) == b.get(i))
    }
}

impl Scanner for GroupedScanner {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        loop {
            if self.in_partition && self.grouper.check()? {
                return Ok(Some(self.grouper.step()?));
            }
            if self.in_partition && self.source_done && self.pending.is_none() {
                // Fully drained final partition.
                return Ok(None);
            }
            if !self.in_partition {
                let first = match self.pending.take() {
                    Some(row) => Some(row),
                    None => {
                        if self.source_done {
                            return Ok(None);
                        }
                        self.source.step()?
                    }
                };
                let Some(first) = first else {
                    self.source_done = true;
                    return Ok(None);
                };
                self.grouper.begin(&first)?;
                self.head = Some(first);
                self.in_partition = true;
                continue;
            }
            // Feed one more input row, or close the partition.
            if self.pending.is_some() {
                // Boundary already seen; the partition only lacked
                // draining, which check() above said is complete.
                self.in_partition = false;
                continue;
            }
            match self.source.step()? {
                Some(next) => {
                    let head = self.head.as_ref().expect("partition in progress");
                    if self.same_partition(head, &next) {
                        self.grouper.accumulate(&next)?;
                    } else {
                        self.grouper.finished();
                        self.pending = Some(next);
                    }
                }
                None => {
                    self.grouper.finished();
                    self.source_done = true;
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
            Column::new("part", Type::basic(Primitive::Text)),
            Column::new("v", Type::basic(Primitive::Long)),
        ])
        .unwrap()
    }

    fn row(part: &str, v: i64) -> Row {
        Row::new(schema(), vec![Value::Text(part.into()), Value::Long(v)]).unwrap()
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

    /// Emits each buffered row with a one-row delay, exercising the
    /// ready/drain protocol: a row becomes ready only once its
    /// successor (or the end of the partition) has been seen.
    struct DelayEcho {
        buffered: std::collections::VecDeque<Row>,
        ready: usize,
    }

    impl TableGrouper for DelayEcho {
        fn begin(&mut self, row: &Row) -> Result<(), EvalError> {
            self.buffered.clear();
            self.ready = 0;
            self.buffered.push_back(row.clone());
            Ok(())
        }
        fn accumulate(&mut self, row: &Row) -> Result<(), EvalError> {
            self.ready += 1;
            self.buffered.push_back(row.clone());
            Ok(())
        }
        fn finished(&mut self) {
            self.ready = self.buffered.len();
        }
        fn check(&mut self) -> Result<bool, EvalError> {
            Ok(self.ready > 0)
        }
        fn step(&mut self) -> Result<Row, EvalError> {
            self.ready -= 1;
            Ok(self.buffered.pop_front().expect("ready row"))
        }
    }

    struct EchoFactory;

    impl GrouperFactory for EchoFactory {
        fn new_grouper(&self) -> Box<dyn TableGrouper> {
            Box::new(DelayEcho {
                buffered: std::collections::VecDeque::new(),
                ready: 0,
            })
        }
    }

    #[test]
    fn test_partition_boundaries() {
        let source: TableRef = Arc::new(FixedTable(vec![
            row("a", 1),
            row("a", 2),
            row("b", 3),
        ]));
        let table = group(
            source,
            &["part".to_string()],
            &[],
            schema(),
            Arc::new(EchoFactory),
        );
        let mut scanner = table.new_scanner(&[]).unwrap();
        let mut out = Vec::new();
        while let Some(r) = scanner.step().unwrap() {
            out.push(r.get(1).clone());
        }
        assert_eq!(out, vec![Value::Long(1), Value::Long(2), Value::Long(3)]);
    }

    #[test]
    fn test_empty_input() {
        let source: TableRef = Arc::new(FixedTable(vec![]));
        let table = group(source, &[], &[], schema(), Arc::new(EchoFactory));
        let mut scanner = table.new_scanner(&[]).unwrap();
        assert!(scanner.step().unwrap().is_none());
    }
}
