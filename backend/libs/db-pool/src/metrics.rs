//! Prometheus metrics for the database connection pool
//!
//! Tracks pool size by state; refreshed by a background task started in
//! `create_pool`.

use prometheus::{register_int_gauge_vec, IntGaugeVec};
use sqlx::PgPool;
use std::time::Duration;

lazy_static::lazy_static! {
    /// Database connection pool size by state (idle/active/max)
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Update connection pool gauges
pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(size - idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(pool.options().get_max_connections() as i64);
}

/// Refresh gauges periodically until the pool is closed
pub(crate) fn spawn_metrics_updater(pool: PgPool, service: String) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(METRICS_REFRESH_INTERVAL);
        loop {
            interval.tick().await;
            if pool.is_closed() {
                tracing::debug!(service = %service, "Pool closed, stopping metrics updater");
                break;
            }
            update_pool_metrics(&pool, &service);
        }
    });
}
