/*!
 * Structured Tracing
 * Subscriber setup and job spans using the tracing crate
 *
 * Features:
 * - `EnvFilter` driven by `RUST_LOG`
 * - Optional JSON output for log shipping
 * - Per-job spans with duration and outcome
 */

use crate::core::types::ThreadCategory;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, span, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - TASKWEAVE_TRACE_JSON: Enable JSON output (default: false)
///
/// A second call is a no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("TASKWEAVE_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
    };

    if result.is_ok() {
        debug!(json = use_json, "tracing initialized");
    }
}

/// Span covering one job execution on a worker thread
pub struct JobSpan {
    span: Span,
    start: Instant,
}

impl JobSpan {
    pub fn new(category: ThreadCategory) -> Self {
        let job_id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::TRACE,
            "job",
            job_id,
            category = category.as_str(),
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Record outcome and elapsed time
    pub fn finish(self, success: bool) {
        self.span
            .record("duration_us", self.start.elapsed().as_micros() as u64);
        self.span
            .record("result", if success { "success" } else { "panic" });
    }
}
