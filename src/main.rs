/*!
 * Taskweave Demo
 *
 * Exercises the dispatcher end to end:
 * - Throttled trigger hammered from several threads
 * - Concurrency-limited trigger
 * - Periodic job driven by the timeout scheduler
 */

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use taskweave::{init_tracing, Dispatcher, DispatcherConfig, ThreadCategory};

fn main() -> Result<()> {
    init_tracing();
    info!("taskweave demo starting");

    let dispatcher =
        Dispatcher::new(DispatcherConfig::default()).context("failed to start dispatcher")?;

    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    let refresh = dispatcher.throttle(
        ThreadCategory::Interactive,
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
        },
        Some(Duration::from_millis(10)),
    );

    let uploads = Arc::new(AtomicUsize::new(0));
    let counter = uploads.clone();
    let upload = dispatcher
        .limit(
            ThreadCategory::Blocking,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            },
            2,
        )
        .context("failed to create upload limiter")?;

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let heartbeat = dispatcher
        .submit_every(ThreadCategory::Background, Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .context("failed to schedule heartbeat")?;

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let refresh = refresh.clone();
            let upload = upload.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    refresh.fire();
                    upload.fire();
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();
    for producer in producers {
        producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    }

    while !(refresh.is_idle() && upload.is_idle()) {
        thread::sleep(Duration::from_millis(10));
    }
    heartbeat.stop();

    info!(
        triggers = 100,
        refreshes = refreshes.load(Ordering::SeqCst),
        uploads = uploads.load(Ordering::SeqCst),
        heartbeats = ticks.load(Ordering::SeqCst),
        "demo finished"
    );
    for category in ThreadCategory::ALL {
        let stats = dispatcher.pool_stats(category);
        info!(
            %category,
            threads = stats.threads,
            jobs_run = stats.jobs_run,
            utilization = stats.utilization,
            "pool"
        );
    }

    dispatcher.shutdown();
    Ok(())
}
