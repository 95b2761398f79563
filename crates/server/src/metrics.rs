//! Prometheus metrics for the tally server.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus
//! scraping and carries no per-domain data, only aggregate counters.
//! When enabled, restrict it to authorized scraper IPs at the
//! infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static VIEWS_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("tally_views_recorded_total", "Total number of views recorded")
        .expect("metric creation failed")
});

pub static VIEW_READS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_view_reads_total",
        "Total number of total-count reads served",
    )
    .expect("metric creation failed")
});

pub static DAILY_QUERIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_daily_queries_total",
        "Total number of daily statistics queries served",
    )
    .expect("metric creation failed")
});

pub static ARCHIVE_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_archive_runs_total",
        "Total number of completed archival runs",
    )
    .expect("metric creation failed")
});

pub static ARCHIVE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_archive_failures_total",
        "Total number of failed archival runs",
    )
    .expect("metric creation failed")
});

pub static ARCHIVED_ROWS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_archived_rows_total",
        "Total daily rows moved to the archive",
    )
    .expect("metric creation failed")
});

pub static RATE_LIMITED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tally_rate_limited_total",
        "Total requests rejected by the rate limiter",
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(VIEWS_RECORDED.clone()),
            Box::new(VIEW_READS.clone()),
            Box::new(DAILY_QUERIES.clone()),
            Box::new(ARCHIVE_RUNS.clone()),
            Box::new(ARCHIVE_FAILURES.clone()),
            Box::new(ARCHIVED_ROWS.clone()),
            Box::new(RATE_LIMITED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!(error = %e, "failed to register metric");
            }
        }
    });
}

/// `GET /metrics` - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }
    (StatusCode::OK, buffer).into_response()
}
