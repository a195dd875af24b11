// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # In-memory storage double
//!
//! [`MemTable`] implements the storage [`Table`] interface over a row
//! vector, including the native `view` contract: the received query
//! string is parsed with the real parser, evaluated row by row, sorted
//! by the projection's ordering flags, and — importantly for tests —
//! recorded, so pushdown behavior can be asserted.

use std::sync::{Arc, Mutex, RwLock};

use relq_types::{Row, TupleType, Value};

use relq_engine::{eval, eval_filter, EvalContext};
use relq_expr::{Expr, ProjExpr, ProjFlags};
use relq_function_registry::StandardFunctionFinder;
use relq_parse::parse_query;
use relq_store::{QueryPlan, Scanner, StoreError, StoreResult, Table, TableRef, Updater};

/// Shared row storage
struct MemInner {
    name: String,
    row_type: Arc<TupleType>,
    rows: RwLock<Vec<Row>>,
    /// Every `(query, args)` pair received by [`Table::view`]
    views: Mutex<Vec<(String, Vec<Value>)>>,
}

/// An in-memory table with native view support
#[derive(Clone)]
pub struct MemTable {
    inner: Arc<MemInner>,
}

impl MemTable {
    pub fn new(name: impl Into<String>, row_type: Arc<TupleType>, rows: Vec<Row>) -> Self {
        Self {
            inner: Arc::new(MemInner {
                name: name.into(),
                row_type,
                rows: RwLock::new(rows),
                views: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The view query strings this table received, in order.
    pub fn recorded_views(&self) -> Vec<(String, Vec<Value>)> {
        self.inner.views.lock().expect("views").clone()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.inner.rows.read().expect("rows").clone()
    }
}

impl Table for MemTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.inner.row_type)
    }

    fn new_scanner(&self, _args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        Ok(Box::new(relq_store::VecScanner::new(self.rows())))
    }

    fn new_updater(&self, _args: &[Value]) -> StoreResult<Box<dyn Updater>> {
        Ok(Box::new(MemUpdater {
            inner: Arc::clone(&self.inner),
            position: None,
        }))
    }

    fn view(&self, query: &str, args: &[Value]) -> StoreResult<TableRef> {
        self.inner
            .views
            .lock()
            .expect("views")
            .push((query.to_string(), args.to_vec()));

        let finder = StandardFunctionFinder::new();
        let parsed = parse_query(Arc::clone(&self.inner.row_type), &finder, query)
            .map_err(|e| StoreError::Unsupported(format!("bad view query {query:?}: {e}")))?;

        let projection = match parsed.projection {
            Some(projection) => projection,
            None => identity_projection(&self.inner.row_type),
        };
        let names: Vec<&str> = projection.iter().map(|p| p.name.as_str()).collect();
        let row_type = Arc::new(self.inner.row_type.project(&names)?);
        Ok(Arc::new(ViewTable {
            inner: Arc::clone(&self.inner),
            filter: parsed.filter,
            projection,
            row_type,
            args: args.to_vec(),
        }))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::Scan {
            table: self.inner.name.clone(),
        }
    }

    fn describe(&self) -> String {
        self.inner.name.clone()
    }
}

fn identity_projection(row_type: &Arc<TupleType>) -> Vec<ProjExpr> {
    row_type
        .columns()
        .iter()
        .map(|col| {
            let expr = Expr::Column(
                relq_expr::ColumnExpr::resolve(
                    relq_expr::Span::default(),
                    Arc::clone(row_type),
                    vec![col.name.clone()],
                )
                .expect("own column"),
            );
            ProjExpr::make(
                relq_expr::Span::default(),
                col.name.clone(),
                ProjFlags::default(),
                expr,
            )
            .expect("plain projection")
        })
        .collect()
}

/// A natively filtered, projected and ordered view of a [`MemTable`]
struct ViewTable {
    inner: Arc<MemInner>,
    filter: Option<Expr>,
    projection: Vec<ProjExpr>,
    row_type: Arc<TupleType>,
    args: Vec<Value>,
}

impl Table for ViewTable {
    fn row_type(&self) -> Arc<TupleType> {
        Arc::clone(&self.row_type)
    }

    fn new_scanner(&self, _args: &[Value]) -> StoreResult<Box<dyn Scanner>> {
        let snapshot = self.inner.rows.read().expect("rows").clone();
        let mut selected = Vec::new();
        for row in snapshot {
            let mut cx = EvalContext::new(&row, &self.args);
            if let Some(filter) = &self.filter {
                if !eval_filter(filter, &mut cx)? {
                    continue;
                }
            }
            let mut values = Vec::with_capacity(self.projection.len());
            for proj in &self.projection {
                values.push(eval(&proj.expr, &mut cx)?);
            }
            selected.push(Row::new(Arc::clone(&self.row_type), values)?);
        }

        // Ordering flags sort by projection position.
        let order: Vec<(usize, bool, bool)> = self
            .projection
            .iter()
            .enumerate()
            .filter(|(_, p)| p.flags.contains(ProjFlags::ORDER_BY))
            .map(|(i, p)| {
                (
                    i,
                    p.flags.contains(ProjFlags::DESCENDING),
                    p.flags.contains(ProjFlags::NULL_LOW),
                )
            })
            .collect();
        if !order.is_empty() {
            selected.sort_by(|a, b| compare_rows(a, b, &order));
        }
        Ok(Box::new(relq_store::VecScanner::new(selected)))
    }

    fn view(&self, query: &str, _args: &[Value]) -> StoreResult<TableRef> {
        Err(StoreError::Unsupported(format!(
            "nested view {query:?} over {}",
            self.describe()
        )))
    }

    fn scan_plan(&self) -> QueryPlan {
        QueryPlan::View {
            query: String::new(),
            source: Box::new(QueryPlan::Scan {
                table: self.inner.name.clone(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("view({})", self.inner.name)
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[(usize, bool, bool)]) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for &(index, descending, null_low) in order {
        let (va, vb) = (a.get(index), b.get(index));
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                if null_low {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, true) => {
                if null_low {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, false) => {
                let ord = va.compare(vb).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

struct MemUpdater {
    inner: Arc<MemInner>,
    position: Option<usize>,
}

impl Scanner for MemUpdater {
    fn step(&mut self) -> StoreResult<Option<Row>> {
        let rows = self.inner.rows.read().expect("rows");
        let next = match self.position {
            None => 0,
            Some(i) => i + 1,
        };
        if next < rows.len() {
            self.position = Some(next);
            Ok(Some(rows[next].clone()))
        } else {
            self.position = Some(rows.len());
            Ok(None)
        }
    }
}

impl Updater for MemUpdater {
    fn update(&mut self, row: Row) -> StoreResult<()> {
        let mut rows = self.inner.rows.write().expect("rows");
        let Some(position) = self.position.filter(|&i| i < rows.len()) else {
            return Err(StoreError::Unsupported("updater is not on a row".into()));
        };
        rows[position] = row;
        Ok(())
    }

    fn delete(&mut self) -> StoreResult<()> {
        let mut rows = self.inner.rows.write().expect("rows");
        let Some(position) = self.position.filter(|&i| i < rows.len()) else {
            return Err(StoreError::Unsupported("updater is not on a row".into()));
        };
        rows.remove(position);
        // Step back so the row that shifted into this slot is next.
        self.position = position.checked_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_view_records_and_filters() {
        let table = fixtures::employees();
        let view = table
            .view("salary > ?1", &[Value::Double(15.0)])
            .unwrap();
        let mut scanner = view.new_scanner(&[]).unwrap();
        let mut ids = Vec::new();
        while let Some(row) = scanner.step().unwrap() {
            ids.push(row.get_named("id").unwrap().clone());
        }
        assert_eq!(ids, vec![Value::Long(3)]);

        let recorded = table.recorded_views();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "salary > ?1");
    }

    #[test]
    fn test_view_projection_and_order() {
        let table = fixtures::employees();
        let view = table.view("{-id, name}", &[]).unwrap();
        let mut scanner = view.new_scanner(&[]).unwrap();
        let mut ids = Vec::new();
        while let Some(row) = scanner.step().unwrap() {
            assert_eq!(row.schema().len(), 2);
            ids.push(row.get(0).clone());
        }
        assert_eq!(ids, vec![Value::Long(3), Value::Long(2), Value::Long(1)]);
    }

    #[test]
    fn test_updater_delete() {
        let table = fixtures::employees();
        let mut updater = table.new_updater(&[]).unwrap();
        while let Some(row) = updater.step().unwrap() {
            if row.get_named("id") == Some(&Value::Long(2)) {
                updater.delete().unwrap();
            }
        }
        assert_eq!(table.rows().len(), 2);
    }
}
