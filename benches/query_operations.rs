//! Benchmark suite for factbase queries and transactions
//!
//! - Insert: facts with a few properties each
//! - Query: indexed equality, range, bitmask AND, unindexed baseline
//! - Transactions: first-write copy, read-only body
//! - Export/import
//!
//! Run: cargo bench --bench query_operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use factbase::{Factbase, Params, Store, Tuning};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fill(fb: &Factbase, count: usize) {
    for i in 0..count as i64 {
        let f = fb.insert().unwrap();
        f.append("id", i).unwrap();
        f.append("kind", ["file", "dir", "link"][(i % 3) as usize]).unwrap();
        f.append("size", (i * 37) % 4096).unwrap();
        f.append("owner", i % 50).unwrap();
    }
}

fn populated(count: usize, tuning: Tuning) -> Factbase {
    let fb = Factbase::with_tuning(tuning);
    fill(&fb, count);
    fb
}

fn run(fb: &Factbase, q: &str) -> usize {
    fb.query(q)
        .unwrap()
        .each(&Params::new(), |f| {
            black_box(f);
            Ok(())
        })
        .unwrap()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let fb = Factbase::new();
                fill(&fb, black_box(size));
            });
        });
    }

    group.finish();
}

fn bench_eq(c: &mut Criterion) {
    let mut group = c.benchmark_group("eq");

    for size in [1000, 10000, 100000] {
        let indexed = populated(size, Tuning::default());
        let plain = populated(size, Tuning::default().with_indexing(false));
        group.bench_with_input(BenchmarkId::new("indexed", size), &indexed, |b, fb| {
            b.iter(|| run(fb, black_box("(eq owner 7)")));
        });
        group.bench_with_input(BenchmarkId::new("scan", size), &plain, |b, fb| {
            b.iter(|| run(fb, black_box("(eq owner 7)")));
        });
    }

    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range");

    for size in [1000, 10000, 100000] {
        let fb = populated(size, Tuning::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &fb, |b, fb| {
            b.iter(|| run(fb, black_box("(gt size 4000)")));
        });
    }

    group.finish();
}

fn bench_bitmask_and(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmask_and");

    for size in [1000, 10000, 100000] {
        let fb = populated(size, Tuning::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &fb, |b, fb| {
            b.iter(|| run(fb, black_box("(and (eq kind 'file') (eq owner 7))")));
        });
    }

    group.finish();
}

fn bench_incremental_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_feed");

    group.bench_function("insert_then_query", |b| {
        b.iter_batched(
            || populated(10000, Tuning::default()),
            |fb| {
                run(&fb, "(eq owner 7)");
                for i in 0..100 {
                    fb.insert().unwrap().append("owner", i % 50).unwrap();
                    run(&fb, "(eq owner 7)");
                }
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_txn(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn");

    for size in [1000, 10000] {
        let fb = populated(size, Tuning::default());
        group.bench_with_input(BenchmarkId::new("read_only", size), &fb, |b, fb| {
            b.iter(|| {
                fb.txn(&mut |t| {
                    black_box(t.size());
                    Ok(())
                })
                .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("copy_and_commit", size), &fb, |b, fb| {
            b.iter(|| {
                fb.txn(&mut |t| {
                    t.insert()?.append("scratch", true)?;
                    t.query("(exists scratch)")?.delete()?;
                    Ok(())
                })
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_export_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_import");

    let fb = populated(10000, Tuning::default());
    let bytes = fb.export().unwrap();
    group.bench_function("export", |b| b.iter(|| fb.export().unwrap()));
    group.bench_function("import", |b| {
        b.iter(|| Factbase::new().import(black_box(&bytes)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_eq,
    bench_range,
    bench_bitmask_and,
    bench_incremental_feed,
    bench_txn,
    bench_export_import,
);
criterion_main!(benches);
