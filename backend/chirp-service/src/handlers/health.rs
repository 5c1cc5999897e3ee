//! Health, readiness and liveness probes

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::handlers::AppState;

#[derive(Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: HashMap<String, ComponentCheck>,
    timestamp: String,
}

pub async fn health_summary(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "chirp-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": format!("Content store unavailable: {}", e),
            "service": "chirp-service"
        })),
    }
}

pub async fn readiness_summary(state: web::Data<AppState>) -> HttpResponse {
    let mut checks = HashMap::new();

    let start = Instant::now();
    let store_check = match state.store.ping().await {
        Ok(_) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "Content store reachable".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            ComponentCheck {
                status: ComponentStatus::Unhealthy,
                message: format!("Content store check failed: {}", e),
                latency_ms: None,
            }
        }
    };
    let ready = matches!(store_check.status, ComponentStatus::Healthy);
    checks.insert("store".to_string(), store_check);

    let response = ReadinessResponse {
        ready,
        status: if ready {
            ComponentStatus::Healthy
        } else {
            ComponentStatus::Unhealthy
        },
        checks,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}
