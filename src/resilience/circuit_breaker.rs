//! Circuit breaker for downstream services.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - Half-Open: probing whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold (checked on the next call)
//! Open → Half-Open: recovery_timeout elapsed since the last failure
//! Half-Open → Closed: success_threshold successes
//! Half-Open → Open: any failure
//! ```
//!
//! Timeouts count as failures. While open, the state is mirrored into the
//! shared cache under `circuit_breaker:{name}`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cache::{keys, Cache};
use crate::config::CircuitBreakerSettings;
use crate::error::AppError;
use crate::observability::metrics;

/// Services whose circuit opening is a security-relevant event.
const CRITICAL_SERVICES: &[&str] = &["payment_gateway", "supabase_storage"];

const PERSISTED_STATE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    /// Per-call deadline. Zero disables it.
    pub timeout: Duration,
}

impl CircuitBreakerConfig {
    fn new(failure: u32, recovery_secs: u64, success: u32, timeout_secs: u64) -> Self {
        Self {
            failure_threshold: failure,
            recovery_timeout: Duration::from_secs(recovery_secs),
            success_threshold: success,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Built-in tuning for known services.
    pub fn preset(service: &str) -> Self {
        match service {
            "plant_identification" => Self::new(3, 30, 2, 45),
            "weather_api" => Self::new(5, 60, 3, 20),
            "ai_services" => Self::new(3, 120, 2, 60),
            "supabase_storage" => Self::new(5, 45, 3, 30),
            "redis_cache" => Self::new(10, 30, 5, 10),
            "notification_delivery" => Self::new(10, 30, 5, 15),
            "care_reminder_service" => Self::new(5, 60, 3, 30),
            "payment_gateway" => Self::new(2, 300, 3, 30),
            _ => Self::default(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(5, 60, 3, 30)
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(s: &CircuitBreakerSettings) -> Self {
        Self::new(
            s.failure_threshold,
            s.recovery_timeout_secs,
            s.success_threshold,
            s.timeout_secs,
        )
    }
}

/// Snapshot of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub success_rate: f64,
}

/// Failure of a protected call.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// Rejected without calling the service.
    #[error("Circuit breaker '{0}' is open. Service unavailable.")]
    Open(String),
    #[error("Service '{service}' timeout after {}s", .after.as_secs())]
    Timeout { service: String, after: Duration },
    #[error("{0}")]
    Inner(E),
}

impl From<CircuitError<AppError>> for AppError {
    fn from(err: CircuitError<AppError>) -> Self {
        match err {
            CircuitError::Open(name) => AppError::ServiceUnavailable(name),
            CircuitError::Timeout { service, after } => AppError::ExternalApi {
                api: service,
                message: format!("timeout after {}s", after.as_secs()),
            },
            CircuitError::Inner(e) => e,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Successes seen since entering half-open.
    probe_successes: u32,
    times_opened: u64,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            probe_successes: 0,
            times_opened: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
            last_failure_time: None,
            last_success_time: None,
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    cache: Option<Cache>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
            cache: None,
        }
    }

    /// Mirror open state into `cache`.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `fut` under the breaker.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, CircuitError<E>>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.before_call()?;

        let outcome = if self.config.timeout.is_zero() {
            Some(fut.await)
        } else {
            tokio::time::timeout(self.config.timeout, fut).await.ok()
        };

        match outcome {
            Some(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Some(Err(e)) => {
                self.record_failure(&e.to_string());
                Err(CircuitError::Inner(e))
            }
            None => {
                self.record_failure("timeout");
                Err(CircuitError::Timeout {
                    service: self.name.clone(),
                    after: self.config.timeout,
                })
            }
        }
    }

    fn before_call<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.lock();
        inner.total_requests += 1;

        if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            self.open(&mut inner);
        }

        if inner.state == CircuitState::Open {
            let recovered = inner
                .last_failure
                .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
            if !recovered {
                tracing::error!(
                    service = %self.name,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "Circuit breaker is open - failing fast"
                );
                return Err(CircuitError::Open(self.name.clone()));
            }
            inner.state = CircuitState::HalfOpen;
            inner.probe_successes = 0;
            metrics::record_circuit_state(&self.name, inner.state.gauge());
            tracing::info!(service = %self.name, "Circuit breaker half-opened");
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;
        inner.last_success_time = Some(Utc::now());

        if inner.state == CircuitState::HalfOpen {
            inner.probe_successes += 1;
            if inner.probe_successes >= self.config.success_threshold {
                self.close(&mut inner);
            }
        }
    }

    fn record_failure(&self, error: &str) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());

        tracing::warn!(
            service = %self.name,
            error = %error,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            "Circuit breaker recorded failure"
        );

        if inner.state == CircuitState::HalfOpen {
            self.open(&mut inner);
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.times_opened += 1;
        metrics::record_circuit_state(&self.name, inner.state.gauge());

        tracing::warn!(
            service = %self.name,
            times_opened = inner.times_opened,
            consecutive_failures = inner.consecutive_failures,
            "Circuit breaker opened"
        );

        if CRITICAL_SERVICES.contains(&self.name.as_str()) {
            crate::security_event!(
                "circuit_breaker_opened",
                service = %self.name,
                times_opened = inner.times_opened,
                "Critical service circuit opened"
            );
        }

        if let Some(cache) = &self.cache {
            cache.set(
                keys::circuit_breaker(&self.name),
                json!({
                    "state": inner.state.as_str(),
                    "failure_count": inner.times_opened,
                    "consecutive_failures": inner.consecutive_failures,
                    "last_failure_time": inner.last_failure_time,
                    "recovery_timeout": self.config.recovery_timeout.as_secs(),
                    "service_name": self.name,
                }),
                Some(PERSISTED_STATE_TTL),
            );
        }
    }

    fn close(&self, inner: &mut Inner) {
        inner.state = CircuitState::Closed;
        inner.times_opened = 0;
        inner.consecutive_failures = 0;
        metrics::record_circuit_state(&self.name, inner.state.gauge());
        tracing::info!(service = %self.name, "Circuit breaker closed");

        if let Some(cache) = &self.cache {
            cache.delete(&keys::circuit_breaker(&self.name));
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.lock();
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            total_requests: inner.total_requests,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            success_rate: if inner.total_requests > 0 {
                inner.total_successes as f64 / inner.total_requests as f64
            } else {
                0.0
            },
        }
    }

    /// Forget all history and close.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Inner::new();
        metrics::record_circuit_state(&self.name, inner.state.gauge());
        if let Some(cache) = &self.cache {
            cache.delete(&keys::circuit_breaker(&self.name));
        }
        tracing::info!(service = %self.name, "Circuit breaker manually reset");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Lazily created breakers, one per service name.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    overrides: HashMap<String, CircuitBreakerSettings>,
    cache: Cache,
}

impl CircuitBreakerRegistry {
    pub fn new(overrides: HashMap<String, CircuitBreakerSettings>, cache: Cache) -> Self {
        Self {
            breakers: DashMap::new(),
            overrides,
            cache,
        }
    }

    /// The breaker for `name`, created from config override or preset.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(name)
                    .map(CircuitBreakerConfig::from)
                    .unwrap_or_else(|| CircuitBreakerConfig::preset(name));
                Arc::new(CircuitBreaker::new(name, config).with_cache(self.cache.clone()))
            })
            .clone()
    }

    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset a known breaker. Unknown names are not created.
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.reset();
        }
    }

    /// Names of breakers currently open.
    pub fn open_circuits(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|b| b.state() == CircuitState::Open)
            .map(|b| b.name().to_string())
            .collect()
    }
}
