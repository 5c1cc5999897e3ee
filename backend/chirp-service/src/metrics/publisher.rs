//! Prometheus metrics for the scheduled post publisher
//!
//! Tracks sweep cycles, published and failed rows, and sweep duration

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};
use std::time::Duration;

/// Total number of sweeps run (success/error)
static PUBLISHER_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chirp_publisher_runs_total",
        "Total number of scheduled post sweeps (success/error)",
        &["status"]
    )
    .expect("failed to register chirp_publisher_runs_total")
});

/// Rows handled per outcome (published/failed)
static PUBLISHER_POSTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chirp_publisher_posts_total",
        "Scheduled posts handled by the publisher segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register chirp_publisher_posts_total")
});

static PUBLISHER_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chirp_publisher_duration_seconds",
        "Duration of one scheduled post sweep",
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .expect("failed to register chirp_publisher_duration_seconds")
});

/// Posts found due in the last sweep
static PUBLISHER_DUE_POSTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "chirp_publisher_due_posts",
        "Number of due scheduled posts found in the last sweep"
    )
    .expect("failed to register chirp_publisher_due_posts")
});

pub fn record_run(status: &str) {
    PUBLISHER_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_duration(duration: Duration) {
    PUBLISHER_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_due_posts(count: usize) {
    PUBLISHER_DUE_POSTS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn record_posts(outcome: &str, count: usize) {
    PUBLISHER_POSTS_TOTAL
        .with_label_values(&[outcome])
        .inc_by(count as u64);
}
