//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, `security` target for audit)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! Request ids (`x-request-id`) are set and propagated by the HTTP layer and
//! appear on the request span.

pub mod logging;
pub mod metrics;
