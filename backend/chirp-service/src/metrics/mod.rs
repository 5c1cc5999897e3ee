//! Prometheus metrics for chirp-service.
//!
//! Collectors register with the default registry on first use; the
//! `/metrics` endpoint renders everything gathered there, including the
//! db-pool gauges.

use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

pub mod feed;
pub mod polls;
pub mod publisher;

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
