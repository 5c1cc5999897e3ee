//! Timeline and trending collectors

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Histogram,
    HistogramVec, IntCounterVec,
};
use std::time::Duration;

/// Timeline builds by outcome (success/error)
static TIMELINE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chirp_timeline_requests_total",
        "Timeline builds segmented by outcome",
        &["status"]
    )
    .expect("failed to register chirp_timeline_requests_total")
});

static TIMELINE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chirp_timeline_duration_seconds",
        "Time to aggregate, rank and hydrate one timeline page",
        &["status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("failed to register chirp_timeline_duration_seconds")
});

/// Items returned per timeline page
static TIMELINE_PAGE_ITEMS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chirp_timeline_page_items",
        "Number of feed items returned per timeline page",
        vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0]
    )
    .expect("failed to register chirp_timeline_page_items")
});

static TRENDING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chirp_trending_duration_seconds",
        "Time to recompute trending hashtags",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .expect("failed to register chirp_trending_duration_seconds")
});

/// Posts scanned by the last trending computation
static TRENDING_POSTS_SCANNED: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "chirp_trending_posts_scanned",
        "Visible posts scanned per trending computation",
        vec![10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]
    )
    .expect("failed to register chirp_trending_posts_scanned")
});

pub fn observe_timeline(duration: Duration, status: &str) {
    TIMELINE_REQUESTS_TOTAL.with_label_values(&[status]).inc();
    TIMELINE_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn observe_page_size(items: usize) {
    TIMELINE_PAGE_ITEMS.observe(items as f64);
}

pub fn observe_trending(duration: Duration, posts_scanned: usize) {
    TRENDING_DURATION_SECONDS.observe(duration.as_secs_f64());
    TRENDING_POSTS_SCANNED.observe(posts_scanned as f64);
}
