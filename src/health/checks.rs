//! Component checks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::http::AppState;

/// Components that can be checked individually.
pub const COMPONENTS: [&str; 5] = ["cache", "event_bus", "user_store", "jobs", "circuit_breakers"];

/// Components that must be healthy to serve traffic.
pub const READINESS_COMPONENTS: [&str; 3] = ["cache", "event_bus", "user_store"];

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Working, with something worth attention. Does not fail probes.
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub latency_ms: f64,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub environment: &'static str,
    pub checks: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

/// Run one named check. `None` for unknown components.
pub async fn check_component(state: &AppState, component: &str) -> Option<ComponentHealth> {
    if !COMPONENTS.contains(&component) {
        return None;
    }
    let start = Instant::now();
    let outcome = tokio::time::timeout(CHECK_TIMEOUT, probe(state, component)).await;
    let (status, details) = match outcome {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(component, "Health check timed out");
            (HealthStatus::Unhealthy, json!({ "error": "check timed out" }))
        }
    };
    if status == HealthStatus::Unhealthy {
        tracing::warn!(component, details = %details, "Component unhealthy");
    }
    Some(ComponentHealth {
        component: component.to_string(),
        status,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        details,
    })
}

async fn probe(state: &AppState, component: &str) -> (HealthStatus, Value) {
    match component {
        "cache" => {
            let healthy = state.cache.ping();
            let stats = state.cache.stats();
            (status_of(healthy), json!(stats))
        }
        "event_bus" => {
            let health = state.events.health();
            (status_of(health.healthy), json!(health))
        }
        "user_store" => {
            let healthy = state.users.repository().ping().await;
            (status_of(healthy), json!({ "backend": "in_memory" }))
        }
        "jobs" => {
            let stats = state.jobs.stats();
            let capacity = state.jobs.config().queue_capacity;
            let saturated: Vec<_> = stats
                .queued
                .iter()
                .filter(|(_, depth)| **depth >= capacity)
                .map(|(queue, _)| queue.as_str())
                .collect();
            let status = if saturated.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            };
            (
                status,
                json!({
                    "enabled": stats.enabled,
                    "queued": stats.queued,
                    "running": stats.running,
                    "failed": stats.failed,
                    "saturated_queues": saturated,
                }),
            )
        }
        "circuit_breakers" => {
            let open = state.breakers.open_circuits();
            let status = if open.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            };
            (
                status,
                json!({ "open_circuits": open, "breakers": state.breakers.all_stats() }),
            )
        }
        _ => (HealthStatus::Unhealthy, json!({ "error": "unknown component" })),
    }
}

fn status_of(healthy: bool) -> HealthStatus {
    if healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    }
}

/// Run `components` concurrently and fold them into a report.
pub async fn run_checks(state: &AppState, components: &[&str]) -> HealthReport {
    let checks: Vec<ComponentHealth> = futures_util::future::join_all(
        components.iter().map(|c| check_component(state, c)),
    )
    .await
    .into_iter()
    .flatten()
    .collect();

    let status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config().environment.as_str(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn test_fresh_state_is_healthy() {
        let state = AppState::new(AppConfig::default(), None);
        let report = run_checks(&state, &COMPONENTS).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), COMPONENTS.len());
    }

    #[tokio::test]
    async fn test_unknown_component() {
        let state = AppState::new(AppConfig::default(), None);
        assert!(check_component(&state, "database").await.is_none());
    }

    #[tokio::test]
    async fn test_open_circuit_degrades() {
        let state = AppState::new(AppConfig::default(), None);
        let breaker = state.breakers.get("weather_api");
        for _ in 0..6 {
            let _ = breaker.call(async { Err::<(), _>("down") }).await;
        }
        let check = check_component(&state, "circuit_breakers").await.unwrap();
        assert_eq!(check.status, HealthStatus::Degraded);

        let report = run_checks(&state, &COMPONENTS).await;
        assert!(report.is_healthy());
    }
}
