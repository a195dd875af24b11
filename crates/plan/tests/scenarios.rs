// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! End-to-end scenarios: compile against an in-memory table, scan, and
//! check both the results and what was pushed into storage.

use std::sync::Arc;

use relq_function_registry::StandardFunctionFinder;
use relq_plan::{compile, PlanError};
use relq_store::TableRef;
use relq_test_utils::{collect, column_values, employee, employee_type, series, MemTable};
use relq_types::Value;

fn spec_rows() -> MemTable {
    MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", None, "y", false),
        ],
    )
}

fn scan(table: &TableRef) -> Vec<relq_types::Row> {
    collect(table.new_scanner(&[]).unwrap())
}

#[test]
fn projection_only_scans_two_columns() {
    let table = spec_rows();
    let finder = StandardFunctionFinder::new();
    let query = compile(Arc::new(table.clone()), &finder, "{id, name}").unwrap();

    assert_eq!(query.argument_count(), 0);
    let result = query.table(&[]).unwrap();
    let rows = scan(&result);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].schema().len(), 2);
    assert_eq!(
        column_values(&rows, "name"),
        vec![Value::Text("a".into()), Value::Text("b".into())]
    );
}

#[test]
fn pushed_filter_reaches_storage_with_numbered_param() {
    let table = spec_rows();
    let finder = StandardFunctionFinder::new();
    let query = compile(Arc::new(table.clone()), &finder, "salary > ?").unwrap();

    assert_eq!(query.argument_count(), 1);
    let result = query.table(&[Value::Double(5.0)]).unwrap();
    let rows = scan(&result);
    assert_eq!(column_values(&rows, "id"), vec![Value::Long(1)]);

    let views = table.recorded_views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].0, "salary > ?1");
    assert_eq!(views[0].1, vec![Value::Double(5.0)]);
}

#[test]
fn partial_push_splits_between_storage_and_mapper() {
    let table = MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "a", Some(11.0), "x", false),
            employee(3, "b", Some(12.0), "x", true),
        ],
    );
    let finder = StandardFunctionFinder::new();
    // The call is opaque to storage; only `active` can push down.
    let query = compile(
        Arc::new(table.clone()),
        &finder,
        "active && self(name) == \"a\"",
    )
    .unwrap();

    let result = query.table(&[]).unwrap();
    let rows = scan(&result);
    assert_eq!(column_values(&rows, "id"), vec![Value::Long(1)]);

    // Storage saw the pushable half, with its literal canonicalized
    // into an appended argument.
    let views = table.recorded_views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].0, "active == ?1");
    assert_eq!(views[0].1, vec![Value::Boolean(true)]);
}

#[test]
fn aggregation_groups_and_skips_nulls() {
    let table = MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", None, "x", true),
            employee(3, "c", Some(20.0), "y", true),
        ],
    );
    let finder = StandardFunctionFinder::new();
    let query = compile(
        Arc::new(table),
        &finder,
        "{dept, total = sum(salary), n = count()}",
    )
    .unwrap();

    let rows = scan(&query.table(&[]).unwrap());
    assert_eq!(
        column_values(&rows, "dept"),
        vec![Value::Text("x".into()), Value::Text("y".into())]
    );
    // Nulls are excluded from the sum; the zero-argument count counts
    // every row of the group.
    assert_eq!(
        column_values(&rows, "total"),
        vec![Value::Double(10.0), Value::Double(20.0)]
    );
    assert_eq!(
        column_values(&rows, "n"),
        vec![Value::Long(2), Value::Long(1)]
    );
}

#[test]
fn window_average_over_rows_frame() {
    let table = MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", Some(20.0), "x", true),
            employee(3, "c", Some(30.0), "x", true),
            employee(4, "d", Some(40.0), "x", true),
        ],
    );
    let finder = StandardFunctionFinder::new();
    let query = compile(
        Arc::new(table),
        &finder,
        "{id, avg3 = avg(salary, rows: -1..1)}",
    )
    .unwrap();

    let rows = scan(&query.table(&[]).unwrap());
    assert_eq!(
        column_values(&rows, "id"),
        vec![
            Value::Long(1),
            Value::Long(2),
            Value::Long(3),
            Value::Long(4)
        ]
    );
    // Edges average only the rows that exist.
    assert_eq!(
        column_values(&rows, "avg3"),
        vec![
            Value::Double(15.0),
            Value::Double(20.0),
            Value::Double(30.0),
            Value::Double(35.0)
        ]
    );
}

#[test]
fn window_sum_over_range_frame() {
    let table = series(&[(1, 10), (2, 20), (4, 30), (10, 40)]);
    let finder = StandardFunctionFinder::new();
    let query = compile(
        Arc::new(table),
        &finder,
        "{+ts, s = sum(value, range: 0..2)}",
    )
    .unwrap();

    let rows = scan(&query.table(&[]).unwrap());
    // Each frame covers the current row plus rows whose ts is within
    // +2 of it.
    assert_eq!(
        column_values(&rows, "s"),
        vec![
            Value::Long(30),
            Value::Long(50),
            Value::Long(30),
            Value::Long(40)
        ]
    );
}

#[test]
fn range_frame_requires_an_ordering() {
    let table = series(&[(1, 10)]);
    let finder = StandardFunctionFinder::new();
    let err = compile(
        Arc::new(table),
        &finder,
        "{ts, s = sum(value, range: 0..2)}",
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::UnorderedWindow(_)));
}

#[test]
fn too_few_arguments_is_an_error() {
    let table = spec_rows();
    let finder = StandardFunctionFinder::new();
    let query = compile(Arc::new(table), &finder, "salary > ? && id < ?").unwrap();
    assert_eq!(query.argument_count(), 2);
    let err = query.table(&[Value::Double(1.0)]).unwrap_err();
    assert!(matches!(
        err,
        PlanError::ArgumentCount {
            required: 2,
            supplied: 1
        }
    ));
}

#[test]
fn excluded_order_column_sorts_then_disappears() {
    let table = MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(3, "c", Some(30.0), "x", true),
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", Some(20.0), "x", true),
        ],
    );
    let finder = StandardFunctionFinder::new();
    let query = compile(Arc::new(table), &finder, "{~-id, name}").unwrap();

    let rows = scan(&query.table(&[]).unwrap());
    // Sorted by descending id, which itself is stripped.
    assert_eq!(rows[0].schema().len(), 1);
    assert_eq!(
        column_values(&rows, "name"),
        vec![
            Value::Text("c".into()),
            Value::Text("b".into()),
            Value::Text("a".into())
        ]
    );
}

#[test]
fn updater_refused_on_derived_layers() {
    let table = spec_rows();
    let finder = StandardFunctionFinder::new();
    let query = compile(
        Arc::new(table),
        &finder,
        "{dept, n = count()}",
    )
    .unwrap();
    let err = query.new_updater(&[]).unwrap_err();
    assert!(matches!(err, PlanError::ReadOnlyView(_)));
}

#[test]
fn scanner_plan_shows_the_layering() {
    let table = spec_rows();
    let finder = StandardFunctionFinder::new();
    let query = compile(
        Arc::new(table),
        &finder,
        "active && self(name) == \"a\"",
    )
    .unwrap();
    let plan = query.scanner_plan().to_string();
    assert!(plan.contains("view"), "plan was:\n{plan}");
    assert!(plan.contains("map"), "plan was:\n{plan}");
    assert!(plan.contains("scan: employees"), "plan was:\n{plan}");
}
