use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Vote attempts by outcome (accepted/duplicate/closed/unknown_option/missing_option)
static POLL_VOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chirp_poll_votes_total",
        "Poll vote attempts segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register chirp_poll_votes_total")
});

static POLLS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("chirp_polls_created_total", "Total polls created")
        .expect("failed to register chirp_polls_created_total")
});

pub fn record_vote(outcome: &str) {
    POLL_VOTES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_poll_created() {
    POLLS_CREATED_TOTAL.inc();
}
