// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! End-to-end compile benchmarks: parse + plan + cache lookup.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use relq_function_registry::StandardFunctionFinder;
use relq_plan::compile;
use relq_test_utils::{employee, employee_type, MemTable};

fn sample_table() -> Arc<MemTable> {
    Arc::new(MemTable::new(
        "employees",
        employee_type(),
        vec![
            employee(1, "a", Some(10.0), "x", true),
            employee(2, "b", None, "y", false),
        ],
    ))
}

fn bench_compile(c: &mut Criterion) {
    let table = sample_table();
    let finder = StandardFunctionFinder::new();

    c.bench_function("compile_pushed_filter", |b| {
        b.iter(|| {
            let q = compile(
                table.clone(),
                &finder,
                black_box("{id, name} salary > ?1 && active"),
            )
            .unwrap();
            black_box(q.argument_count());
        })
    });

    c.bench_function("compile_aggregation", |b| {
        b.iter(|| {
            let q = compile(
                table.clone(),
                &finder,
                black_box("{dept, total = sum(salary), n = count()}"),
            )
            .unwrap();
            black_box(q.row_type());
        })
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
