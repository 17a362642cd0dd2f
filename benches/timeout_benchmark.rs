/*!
 * Timeout Scheduler Benchmarks
 *
 * Cost of queueing and cancelling tasks and of a near-immediate round trip
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::mpsc;
use std::time::Duration;
use taskweave::{Task, TimeoutScheduler};

/// Benchmark: queue far-future tasks, then stop them
fn bench_add_and_stop(c: &mut Criterion) {
    let scheduler = TimeoutScheduler::start().expect("scheduler");
    let mut group = c.benchmark_group("timeout/add_and_stop");

    for batch in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let handles: Vec<_> = (0..batch)
                    .filter_map(|_| scheduler.try_add(Task::once(Duration::from_secs(3600), || {})).ok())
                    .collect();
                for handle in &handles {
                    handle.stop();
                }
                black_box(handles.len());
            });
        });
    }

    group.finish();
    scheduler.shutdown();
}

/// Benchmark: schedule with zero delay and wait for the run
fn bench_round_trip(c: &mut Criterion) {
    let scheduler = TimeoutScheduler::start().expect("scheduler");

    c.bench_function("timeout/round_trip", |b| {
        b.iter(|| {
            let (tx, rx) = mpsc::channel();
            scheduler
                .schedule_once(Duration::ZERO, move || {
                    let _ = tx.send(());
                })
                .ok();
            black_box(rx.recv_timeout(Duration::from_secs(1)).ok());
        });
    });

    scheduler.shutdown();
}

criterion_group!(benches, bench_add_and_stop, bench_round_trip);
criterion_main!(benches);
