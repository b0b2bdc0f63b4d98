//! Request middleware and extractors.

pub mod auth;
pub mod client_ip;
pub mod metrics;
pub mod rate_limit;

pub use auth::AuthUser;
pub use client_ip::{client_ip, ClientIp};
pub use metrics::track_metrics;
pub use rate_limit::{enforce, rate_limit_middleware};
