//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a downstream service (external API, storage, notifications):
//!     → circuit_breaker.rs (fail fast when open, per-call deadline)
//!     → On failure: retries.rs (retry while retryable, linear or jittered exponential delays)
//! ```
//!
//! Breakers are per service and created lazily by the registry.

pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitError, CircuitState,
    CircuitStats,
};
pub use retries::{calculate_backoff, retry_async, RetryPolicy};
