//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace span, CORS, body limit, timeout)
//!     → /health/*         → health probes
//!     → /metrics          → Prometheus exposition
//!     → /api/v1/*         → middleware/rate_limit.rs (ip_global per client)
//!                         → middleware/auth.rs (bearer token → AuthUser)
//!                         → handlers/* → UserService / SubscriptionService / ApiRotation
//!     → /admin/*          → admin API (bearer API key)
//!     → middleware/metrics.rs records every matched route
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

pub use server::{build_router, HttpServer, X_REQUEST_ID};
pub use state::{AppContext, AppState};
