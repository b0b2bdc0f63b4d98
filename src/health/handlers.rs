//! Probe endpoints mounted under `/health`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::health::checks::{check_component, run_checks, HealthStatus, COMPONENTS, READINESS_COMPONENTS};
use crate::http::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/startup", get(startup))
        .route("/detailed", get(detailed))
        .route("/components/{component}", get(component))
}

async fn live(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime().as_secs_f64(),
    }))
}

async fn ready(State(state): State<AppState>) -> Response {
    let report = run_checks(&state, &READINESS_COMPONENTS).await;
    let checks: serde_json::Map<String, serde_json::Value> = report
        .checks
        .iter()
        .map(|c| (c.component.clone(), json!(c.status)))
        .collect();
    if report.is_healthy() {
        Json(json!({
            "status": "ready",
            "timestamp": report.timestamp,
            "version": report.version,
            "checks": checks,
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "timestamp": report.timestamp,
                "checks": checks,
            })),
        )
            .into_response()
    }
}

async fn startup(State(state): State<AppState>) -> Response {
    let uptime = state.uptime().as_secs_f64();
    let minimum = state.config().health.minimum_startup_secs;
    if uptime < minimum as f64 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "starting",
                "uptime": uptime,
                "minimum_startup_time": minimum,
                "timestamp": Utc::now(),
            })),
        )
            .into_response();
    }

    let report = run_checks(&state, &READINESS_COMPONENTS).await;
    if report.is_healthy() {
        Json(json!({
            "status": "started",
            "timestamp": report.timestamp,
            "uptime": uptime,
            "version": report.version,
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "startup_failed",
                "checks": report,
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

async fn detailed(State(state): State<AppState>) -> Response {
    let report = run_checks(&state, &COMPONENTS).await;
    let config = state.config();
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": report.status,
        "timestamp": report.timestamp,
        "version": report.version,
        "environment": report.environment,
        "checks": report.checks,
        "circuit_breakers": state.breakers.all_stats(),
        "build_info": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "environment": config.environment.as_str(),
            "debug": cfg!(debug_assertions),
        },
        "runtime_info": {
            "uptime_seconds": state.uptime().as_secs_f64(),
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "worker_concurrency": config.jobs.worker_concurrency,
        },
    });
    (code, Json(body)).into_response()
}

async fn component(State(state): State<AppState>, Path(component): Path<String>) -> Response {
    match check_component(&state, &component).await {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("Component '{component}' not found"),
                "available_components": COMPONENTS,
            })),
        )
            .into_response(),
        Some(check) if check.status == HealthStatus::Unhealthy => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(check)).into_response()
        }
        Some(check) => Json(check).into_response(),
    }
}
