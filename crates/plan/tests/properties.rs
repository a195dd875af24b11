// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Cross-cutting laws of the compiler: filter splitting preserves
//! semantics, normalization never duplicates impure calls, cache keys
//! track structural identity, and literal-canonicalized queries share
//! one compiled artifact.

use std::sync::Arc;

use relq_function_registry::StandardFunctionFinder;
use relq_plan::compile;
use relq_test_utils::{collect, column_values, employee, employee_type, MemTable};
use relq_types::Value;

fn sample() -> MemTable {
    MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", None, "y", false),
            employee(3, "c", Some(20.0), "y", true),
            employee(4, "a", Some(5.0), "x", false),
        ],
    )
}

/// Split correctness: pushing part of a filter into storage must not
/// change which rows survive.
#[test]
fn split_filter_equals_whole_filter() {
    let finder = StandardFunctionFinder::new();
    let queries = [
        "active && self(name) == \"a\"",
        "salary > ?1 && self(dept) == \"y\"",
        "active || salary >= 10.0",
        "(active && dept == \"x\") || (salary > 15.0 && self(name) == \"c\")",
    ];
    for source in queries {
        let split_table = sample();
        let query = compile(Arc::new(split_table.clone()), &finder, source).unwrap();
        let args = vec![Value::Double(1.0)];
        let args = &args[..query.argument_count()];
        let with_split = column_values(
            &collect(query.table(args).unwrap().new_scanner(args).unwrap()),
            "id",
        );

        // Reference: evaluate the whole filter in the mapper by making
        // nothing pushable (storage sees a view only for the wrapped
        // filter's pushable half; wrapping everything in self() calls
        // is the simplest opaque form, so instead compare against a
        // plain row-by-row reference evaluation).
        let reference: Vec<Value> = reference_filter(source, args);
        assert_eq!(with_split, reference, "query {source:?}");
    }
}

/// Row-by-row reference evaluation of a filter, bypassing planning.
fn reference_filter(source: &str, args: &[Value]) -> Vec<Value> {
    let finder = StandardFunctionFinder::new();
    let parsed = relq_parse::parse_query(employee_type(), &finder, source).unwrap();
    let filter = parsed.filter.expect("filter query");
    sample()
        .rows()
        .into_iter()
        .filter(|row| {
            let mut cx = relq_engine::EvalContext::new(row, args);
            relq_engine::eval_filter(&filter, &mut cx).unwrap()
        })
        .map(|row| row.get_named("id").unwrap().clone())
        .collect()
}

/// Queries differing only in literal values share one compiled
/// artifact; the literals travel as appended arguments.
#[test]
fn literal_canonicalization_shares_artifacts() {
    let finder = StandardFunctionFinder::new();
    let table: Arc<MemTable> = Arc::new(sample());

    let low = compile(table.clone(), &finder, "salary > 7.5").unwrap();
    let high = compile(table.clone(), &finder, "salary > 15.0").unwrap();
    assert!(Arc::ptr_eq(low.artifact(), high.artifact()));

    let low_ids = column_values(
        &collect(low.table(&[]).unwrap().new_scanner(&[]).unwrap()),
        "id",
    );
    let high_ids = column_values(
        &collect(high.table(&[]).unwrap().new_scanner(&[]).unwrap()),
        "id",
    );
    assert_eq!(low_ids, vec![Value::Long(1), Value::Long(3)]);
    assert_eq!(high_ids, vec![Value::Long(3)]);

    // Structurally different queries do not share.
    let other = compile(table, &finder, "salary >= 7.5").unwrap();
    assert!(!Arc::ptr_eq(low.artifact(), other.artifact()));
}

/// The same query text always reuses the published artifact.
#[test]
fn repeated_compiles_hit_the_cache() {
    let finder = StandardFunctionFinder::new();
    let table: Arc<MemTable> = Arc::new(sample());
    let a = compile(table.clone(), &finder, "{id} active").unwrap();
    let b = compile(table.clone(), &finder, "{id} active").unwrap();
    assert!(Arc::ptr_eq(a.artifact(), b.artifact()));

    // A different base table of the same shape is a different key.
    let other: Arc<MemTable> = Arc::new(sample());
    let c = compile(other, &finder, "{id} active").unwrap();
    assert!(!Arc::ptr_eq(a.artifact(), c.artifact()));
}

/// Normalization must not duplicate impure calls: a disjunction of
/// `random()` under a conjunction stays in its original shape rather
/// than distributing.
#[test]
fn impure_calls_survive_normalization_once() {
    let finder = StandardFunctionFinder::new();
    let table: Arc<MemTable> = Arc::new(sample());
    // (active && salary > 1.0) || random() < 2.0 — conjunctive
    // normalization would clone the random() disjunct.
    let query = compile(
        table,
        &finder,
        "(active && salary > 1.0) || random() < 2.0",
    )
    .unwrap();
    // random() < 2.0 is always true, so every row must survive exactly
    // once.
    let ids = column_values(
        &collect(query.table(&[]).unwrap().new_scanner(&[]).unwrap()),
        "id",
    );
    assert_eq!(
        ids,
        vec![
            Value::Long(1),
            Value::Long(2),
            Value::Long(3),
            Value::Long(4)
        ]
    );
}

/// Aggregation output depends only on the rows of each group and keeps
/// first-appearance order.
#[test]
fn aggregation_is_deterministic() {
    let finder = StandardFunctionFinder::new();
    let table: Arc<MemTable> = Arc::new(MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(1.0), "m", true),
            employee(2, "b", Some(2.0), "m", true),
            employee(3, "c", Some(4.0), "n", true),
        ],
    ));
    let query = compile(
        table,
        &finder,
        "{dept, total = sum(salary), hi = max(salary), lo = min(salary)}",
    )
    .unwrap();
    for _ in 0..3 {
        let rows = collect(query.table(&[]).unwrap().new_scanner(&[]).unwrap());
        assert_eq!(
            column_values(&rows, "dept"),
            vec![Value::Text("m".into()), Value::Text("n".into())]
        );
        assert_eq!(
            column_values(&rows, "total"),
            vec![Value::Double(3.0), Value::Double(4.0)]
        );
        assert_eq!(
            column_values(&rows, "hi"),
            vec![Value::Double(2.0), Value::Double(4.0)]
        );
        assert_eq!(
            column_values(&rows, "lo"),
            vec![Value::Double(1.0), Value::Double(4.0)]
        );
    }
}
