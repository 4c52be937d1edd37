use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use std::time::Instant;
use stickypool::{
    CORRELATION_FIELD, Engine, JobDescription, JobProcessor, PoolConfig, Result, SlotToken,
    StickyPool, WorkerPool,
};
use tokio::runtime::Builder;

// Number of jobs submitted per benchmark iteration.
const TOTAL_JOBS: usize = 1024;

/// Answers immediately so the benchmarks measure pool overhead only.
struct Noop;

impl Engine for Noop {
    fn run(&mut self, job: &JobDescription) -> Result<serde_json::Value> {
        Ok(job.get(CORRELATION_FIELD)?.as_f64().into())
    }
}

fn job(seq: usize) -> JobDescription {
    JobDescription::new()
        .with(CORRELATION_FIELD, seq as i64)
        .submitted_now()
}

/// Binding lookup on a warm pool: every acquire is a cache hit.
fn bench_sticky_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("sticky_acquire");

    for size in [1, 8, 64] {
        let pool = StickyPool::new(size, |_| Ok(Noop)).unwrap();
        let tokens: Vec<_> = (0..size).map(|_| SlotToken::issue()).collect();
        for token in &tokens {
            drop(pool.acquire(*token).unwrap());
        }
        let last = tokens[size - 1];

        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("slots/{size}"), |b| {
            b.iter(|| black_box(pool.acquire(black_box(last)).unwrap().slot()));
        });
    }

    group.finish();
}

/// Processor overhead around a no-op engine, including record assembly.
fn bench_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor");
    group.throughput(Throughput::Elements(1));

    let processor = JobProcessor::new(std::sync::Arc::new(
        StickyPool::new(1, |_| Ok(Noop)).unwrap(),
    ));
    let token = SlotToken::issue();
    let job = job(0);

    group.bench_function("process", |b| {
        b.iter(|| black_box(processor.process(black_box(&job), token)));
    });

    group.finish();
}

/// Submit-to-result throughput from a single async caller.
fn bench_worker_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool");
    group.throughput(Throughput::Elements(TOTAL_JOBS as u64));

    for workers in [1, 4, 16] {
        let rt = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .build()
            .unwrap();
        let pool = WorkerPool::start(PoolConfig::new(workers), |_| Ok(Noop)).unwrap();

        group.bench_function(format!("workers/{workers}"), |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let pool = &pool;
                async move {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let handles: Vec<_> = (0..TOTAL_JOBS)
                            .map(|i| pool.submit(job(i)).unwrap())
                            .collect();
                        black_box(try_join_all(handles).await.unwrap());
                    }
                    start.elapsed()
                }
            });
        });

        rt.block_on(pool.drain()).unwrap();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sticky_acquire,
    bench_processor,
    bench_worker_pool,
);
criterion_main!(benches);
