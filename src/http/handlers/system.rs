//! Service information, status and module placeholders.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::health::checks::{run_checks, READINESS_COMPONENTS};
use crate::http::AppState;

/// Domain modules served by separate components. Their roots answer 501.
pub const PLACEHOLDER_MODULES: [&str; 10] = [
    "plants",
    "care",
    "health",
    "growth",
    "community",
    "ai",
    "weather",
    "analytics",
    "notifications",
    "payments",
];

pub async fn service_root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "Plant Care API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config().environment.as_str(),
        "status": "running",
        "health_check": "/health/live",
    }))
}

pub async fn api_root(State(state): State<AppState>) -> Json<Value> {
    let config = state.config();
    let general = state.rate_limiter.rule("api_general");
    let free = general.as_ref().map(|r| r.requests).unwrap_or_default();
    Json(json!({
        "message": "Welcome to Plant Care API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": config.environment.as_str(),
        "status": "operational",
        "modules": {
            "users": "available",
            "subscriptions": "available",
            "integrations": "available",
            "placeholders": PLACEHOLDER_MODULES,
        },
        "authentication": {
            "type": "JWT Bearer Token",
            "endpoints": {
                "login": "/api/v1/auth/login",
                "register": "/api/v1/auth/register",
                "refresh": "/api/v1/auth/refresh",
            }
        },
        "rate_limits": {
            "free_tier": format!("{free} requests per hour"),
            "premium_tier": format!("{} requests per hour", free * 5),
        },
    }))
}

pub async fn status(State(state): State<AppState>) -> Response {
    let report = run_checks(&state, &READINESS_COMPONENTS).await;
    let services: serde_json::Map<String, Value> = report
        .checks
        .iter()
        .map(|c| (c.component.clone(), json!(c.status)))
        .collect();
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "status": if report.is_healthy() { "healthy" } else { "degraded" },
            "timestamp": report.timestamp,
            "version": report.version,
            "environment": report.environment,
            "services": services,
            "uptime_seconds": state.uptime().as_secs_f64(),
        })),
    )
        .into_response()
}

pub async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "api_version": "1.0.0",
        "app_version": env!("CARGO_PKG_VERSION"),
        "environment": state.config().environment.as_str(),
        "features": {
            "rate_limiting": true,
            "monitoring": true,
            "caching": true,
            "background_jobs": state.config().jobs.enabled,
        },
    }))
}

/// 501 for a domain module this service does not implement.
pub fn module_placeholder(module: &'static str) -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "module": module,
            "message": format!("The {module} module is not available in this service"),
        })),
    )
        .into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match (&state.metrics, state.config().observability.metrics_enabled) {
        (Some(handle), true) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
