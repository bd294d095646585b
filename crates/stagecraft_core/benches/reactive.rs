//! Benchmarks for the effect scheduler.
//!
//! Run with: cargo bench -p stagecraft_core -- reactive

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use stagecraft_core::{ReactiveGraph, ResourceKind, ResourcePool};

/// Many writes to one signal followed by a single tick.
fn bench_coalesced_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactive/coalesced_writes");

    for writes in [1u64, 16, 256] {
        group.throughput(Throughput::Elements(writes));
        group.bench_with_input(BenchmarkId::from_parameter(writes), &writes, |b, &writes| {
            let mut graph = ReactiveGraph::new();
            let position = graph.create_signal(0.0f32);
            let _effect = graph
                .create_effect(move |cx| {
                    black_box(cx.get(position));
                    Ok(())
                })
                .unwrap();

            let mut next = 0.0f32;
            b.iter(|| {
                for _ in 0..writes {
                    next += 1.0;
                    graph.set(position, next);
                }
                black_box(graph.tick().unwrap());
            });
        });
    }

    group.finish();
}

/// One signal fanned out to many effects, each registering a cleanup.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactive/fan_out");

    for effects in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(effects as u64));
        group.bench_with_input(BenchmarkId::from_parameter(effects), &effects, |b, &effects| {
            let mut graph = ReactiveGraph::new();
            let color = graph.create_signal(0u32);
            for _ in 0..effects {
                graph
                    .create_effect(move |cx| {
                        let value = cx.get(color).unwrap_or(0);
                        cx.on_cleanup(move |_| {
                            black_box(value);
                            Ok(())
                        });
                        Ok(())
                    })
                    .unwrap();
            }

            let mut next = 0u32;
            b.iter(|| {
                next = next.wrapping_add(1);
                graph.set(color, next);
                black_box(graph.tick().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    const MATERIAL: ResourceKind = ResourceKind::new("material");

    c.bench_function("pool/acquire_release_shared", |b| {
        let mut pool: ResourcePool<u64> = ResourcePool::new();
        pool.acquire(MATERIAL, "base", || Ok::<_, ()>(1)).unwrap();

        b.iter(|| {
            let value = pool.acquire(MATERIAL, "base", || Ok::<_, ()>(1)).unwrap();
            black_box(value);
            pool.release(MATERIAL, "base", |_| {}).unwrap();
        });
    });
}

criterion_group!(benches, bench_coalesced_writes, bench_fan_out, bench_pool);
criterion_main!(benches);
