// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Shared schemas and sample data for tests.

use std::sync::Arc;

use relq_types::{Column, Primitive, Row, TupleType, Type, Value};

use crate::mem_table::MemTable;

/// The employee row shape used across the end-to-end tests:
/// `id: long`, `name: string`, `salary: double?`, `dept: string`,
/// `active: boolean`.
pub fn employee_type() -> Arc<TupleType> {
    TupleType::shared(vec![
        Column::new("id", Type::basic(Primitive::Long)),
        Column::new("name", Type::basic(Primitive::Text)),
        Column::new("salary", Type::basic_nullable(Primitive::Double)),
        Column::new("dept", Type::basic(Primitive::Text)),
        Column::new("active", Type::basic(Primitive::Boolean)),
    ])
    .unwrap()
}

/// Build one employee row.
pub fn employee(id: i64, name: &str, salary: Option<f64>, dept: &str, active: bool) -> Row {
    Row::new(
        employee_type(),
        vec![
            Value::Long(id),
            Value::Text(name.into()),
            salary.map(Value::Double).unwrap_or(Value::Null),
            Value::Text(dept.into()),
            Value::Boolean(active),
        ],
    )
    .unwrap()
}

/// A small employees table: three rows, one null salary.
pub fn employees() -> MemTable {
    MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "ana", Some(10.0), "x", true),
            employee(2, "bob", None, "y", false),
            employee(3, "cyn", Some(20.0), "y", true),
        ],
    )
}

/// A timestamped measurement table for window tests:
/// `ts: long`, `value: long`.
pub fn series_type() -> Arc<TupleType> {
    TupleType::shared(vec![
        Column::new("ts", Type::basic(Primitive::Long)),
        Column::new("value", Type::basic(Primitive::Long)),
    ])
    .unwrap()
}

pub fn series(points: &[(i64, i64)]) -> MemTable {
    let rows = points
        .iter()
        .map(|&(ts, value)| {
            Row::new(series_type(), vec![Value::Long(ts), Value::Long(value)]).unwrap()
        })
        .collect();
    MemTable::new("series", series_type(), rows)
}

/// Collect every row of a scanner.
pub fn collect(mut scanner: Box<dyn relq_store::Scanner>) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = scanner.step().expect("scan") {
        rows.push(row);
    }
    rows
}

/// Collect one named column of every row.
pub fn column_values(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter()
        .map(|r| r.get_named(name).expect("column").clone())
        .collect()
}
