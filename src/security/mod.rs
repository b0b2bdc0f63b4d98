//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → rate_limit.rs (ip_global per client IP, auth_* per route)
//!     → tokens.rs (bearer access token → claims)
//!     → permissions.rs (role/resource/action, ownership, premium gating)
//!     → handler
//!
//! Registration / login:
//!     → password.rs (policy check, Argon2id hash/verify)
//!     → tokens.rs (access + refresh pair)
//! ```
//!
//! Denials are logged on the `security` tracing target.

pub mod password;
pub mod permissions;
pub mod rate_limit;
pub mod tokens;

pub use rate_limit::{RateLimitDecision, RateLimitRule, RateLimiter, UserTier};
pub use tokens::{Claims, Principal, TokenKind, TokenPair, TokenService};
