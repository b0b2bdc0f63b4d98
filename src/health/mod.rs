//! Health probe subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health/live        → process is up (no checks)
//! GET /health/ready       → cache, event bus, user store
//! GET /health/startup     → "starting" until minimum uptime, then readiness checks
//! GET /health/detailed    → every component + circuit breakers + build/runtime info
//! GET /health/components/{name}
//!
//! checks.rs runs component probes concurrently, each under a deadline.
//! ```
//!
//! Degraded components (open circuits, full job queues) are reported but do
//! not fail a probe; only unhealthy ones return 503.

pub mod checks;
pub mod handlers;

pub use checks::{check_component, run_checks, ComponentHealth, HealthReport, HealthStatus};
pub use handlers::router;
