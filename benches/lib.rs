//! # deferred 性能基准测试
//!
//! 使用 Criterion.rs 进行性能基准测试。
//!
//! ## 基准测试分组
//! - `chain`: 链式 `then` 的深度
//! - `fan_in`: `all` 的扇入宽度
//! - `scheduler`: 微任务队列吞吐
//!
//! ## 使用方法
//! ```bash
//! cargo bench          # 运行所有
//! cargo bench chain    # 只运行链式基准
//! ```

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use deferred::{all, block_on, defer, run_until_idle, Deferred};

// ============================================================================
// Chain depth
// ============================================================================

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for depth in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut tail = Deferred::resolve(0u64);
                for _ in 0..depth {
                    tail = tail.map(|v| v + 1);
                }
                black_box(block_on(&tail).ok())
            })
        });
    }
    group.finish();
}

// ============================================================================
// Fan-in
// ============================================================================

fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");
    for width in [4usize, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| {
                let pending: Vec<_> = (0..width).map(|_| Deferred::<usize>::pending()).collect();
                let combined: Deferred<Vec<usize>> =
                    all(pending.iter().map(|(deferred, _)| deferred.clone()));
                for (i, (_, resolver)) in pending.iter().enumerate().rev() {
                    resolver.fulfill(i);
                }
                black_box(block_on(&combined).map(|values| values.len()).ok())
            })
        });
    }
    group.finish();
}

// ============================================================================
// Scheduler
// ============================================================================

fn bench_microtasks(c: &mut Criterion) {
    c.bench_function("scheduler/1000_microtasks", |b| {
        b.iter(|| {
            for i in 0..1000u32 {
                defer(move || {
                    black_box(i);
                });
            }
            run_until_idle()
        })
    });
}

criterion_group!(benches, bench_chain, bench_fan_in, bench_microtasks);
criterion_main!(benches);
