//! Criterion benchmarks for minirel.
//!
//! Run with: `cargo bench --bench performance`
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use minirel::{
    Column, DataType, Engine, EngineConfig, ExtendibleHashIndex, ExternalMergeSort, JoinStrategy,
    SelectQuery, Table, Value,
};

fn keyed_table(name: &str, rows: i64, modulus: i64) -> Table {
    let mut table = Table::new(
        name,
        vec![
            Column::new("id", DataType::Integer),
            Column::new("k", DataType::Integer),
        ],
        Some("id"),
    )
    .unwrap();
    for i in 0..rows {
        table
            .insert(vec![Value::Integer(i), Value::Integer((i * 7919) % modulus)])
            .unwrap();
    }
    table
}

fn bench_hash_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_index");

    for size in [1_000i64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("insert", size), &size, |b, &size| {
            b.iter(|| {
                let mut index = ExtendibleHashIndex::with_capacity(8).unwrap();
                for i in 0..size {
                    index.insert(Value::Integer(i), i as usize).unwrap();
                }
                black_box(index.global_depth())
            });
        });
    }

    let mut index = ExtendibleHashIndex::with_capacity(8).unwrap();
    for i in 0..100_000i64 {
        index.insert(Value::Integer(i), i as usize).unwrap();
    }
    group.bench_function("find", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = (i + 7919) % 100_000;
            black_box(index.find(&Value::Integer(i)))
        });
    });

    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let engine = Engine::default();
    let table = keyed_table("t", 50_000, 1_000);
    let index = engine.build_index(&table, "id").unwrap();

    group.bench_function("pk_scan", |b| {
        b.iter(|| {
            let query = SelectQuery::new("*").filter("id = 43210");
            black_box(engine.select(&table, &query).unwrap())
        });
    });
    group.bench_function("pk_hash_index", |b| {
        b.iter(|| {
            let query = SelectQuery::new("*")
                .filter("id = 43210")
                .with_hash_index(&index);
            black_box(engine.select(&table, &query).unwrap())
        });
    });
    group.bench_function("group_by", |b| {
        b.iter(|| {
            let query = SelectQuery::new("k, count(*), sum(id)").group_by("k");
            black_box(engine.select(&table, &query).unwrap())
        });
    });

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");
    group.sample_size(10);
    let engine = Engine::default();

    for size in [200i64, 1_000] {
        let left = keyed_table("l", size, size / 2);
        let right = keyed_table("r", size, size / 2);
        for strategy in [JoinStrategy::NestedLoop, JoinStrategy::SortMerge] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", strategy), size),
                &size,
                |b, _| {
                    b.iter(|| black_box(engine.inner_join(&left, &right, "l.k = r.k", strategy).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_external_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("external_sort");
    group.sample_size(10);
    let config = EngineConfig::default().with_sort_chunk_rows(1_000);
    let input: Vec<String> = (0..20_000i64)
        .map(|i| ((i * 7919) % 20_000).to_string())
        .collect();

    group.bench_function("20k_integers", |b| {
        b.iter(|| {
            black_box(
                ExternalMergeSort::new(&config)
                    .sort("bench", input.clone())
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_hash_index,
    bench_select,
    bench_join,
    bench_external_sort
);
criterion_main!(benches);
