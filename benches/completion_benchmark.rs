//! Completion and combinator benchmarks.
//!
//! Benchmarks:
//! - Callback dispatch on an already-resolved completion
//! - Registration followed by resolution
//! - `all_of` over wide inputs
//! - Lab context job throughput
//!
//! Run:
//!   cargo bench --bench completion_benchmark

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use threadcx::{ExecutorExt, LabContext, OrderedCompletion, all_of, all_of_reduce};

// =============================================================================
// CALLBACK DISPATCH
// =============================================================================

fn bench_callback_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("completion/callbacks");

    for &count in &[1usize, 16, 256] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(
            BenchmarkId::new("register_then_complete", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    OrderedCompletion::<u64>::new,
                    |cell| {
                        let hits = Arc::new(AtomicUsize::new(0));
                        for _ in 0..count {
                            let hits = Arc::clone(&hits);
                            cell.when_complete(move |_| {
                                hits.fetch_add(1, Ordering::Relaxed);
                            });
                        }
                        cell.complete(1);
                        black_box(hits.load(Ordering::Relaxed))
                    },
                    BatchSize::SmallInput,
                )
            },
        );

        group.bench_with_input(
            BenchmarkId::new("register_after_complete", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || OrderedCompletion::completed(1_u64),
                    |cell| {
                        let hits = Arc::new(AtomicUsize::new(0));
                        for _ in 0..count {
                            let hits = Arc::clone(&hits);
                            cell.when_complete(move |_| {
                                hits.fetch_add(1, Ordering::Relaxed);
                            });
                        }
                        black_box(hits.load(Ordering::Relaxed))
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

// =============================================================================
// JOIN
// =============================================================================

fn bench_all_of(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinator/all_of");

    for &width in &[10usize, 100, 1000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("collect", width), &width, |b, &width| {
            b.iter_batched(
                || (0..width).map(|_| OrderedCompletion::<usize>::new()).collect::<Vec<_>>(),
                |inputs| {
                    let joined = all_of(inputs.clone());
                    for (i, input) in inputs.iter().enumerate().rev() {
                        input.complete(i);
                    }
                    black_box(joined.is_done())
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("reduce", width), &width, |b, &width| {
            b.iter_batched(
                || (0..width).map(OrderedCompletion::completed).collect::<Vec<_>>(),
                |inputs| black_box(all_of_reduce(inputs, |a, b| a + b, 0).is_done()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// =============================================================================
// LAB CONTEXT
// =============================================================================

fn bench_lab_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("context/lab");
    let jobs = 1024usize;
    group.throughput(Throughput::Elements(jobs as u64));

    group.bench_function("submit_and_drain", |b| {
        b.iter_batched(
            LabContext::new,
            |lab| {
                let hits = Arc::new(AtomicUsize::new(0));
                for _ in 0..jobs {
                    let hits = Arc::clone(&hits);
                    let _ = lab.submit(move || {
                        hits.fetch_add(1, Ordering::Relaxed);
                    });
                }
                black_box(lab.run_until_idle())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// =============================================================================
// MAIN
// =============================================================================

criterion_group!(
    benches,
    bench_callback_dispatch,
    bench_all_of,
    bench_lab_throughput,
);

criterion_main!(benches);
