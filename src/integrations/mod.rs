//! Third-party API integrations.
//!
//! # Data Flow
//! ```text
//! Feature needs an external API (identification, weather, AI chat):
//!     → rotation.rs best_provider (limits per user/tier, priority, health)
//!     → caller invokes the provider under its circuit breaker
//!     → rotation.rs record_usage (daily counter, moving-average stats)
//!
//! rotate-api-usage job (hourly) → rotate_daily_usage, clearing on a new UTC day
//! ```

pub mod providers;
pub mod rotation;

pub use providers::{ApiLimits, ApiProvider, ApiTier, ServiceType};
pub use rotation::{ApiCallOutcome, ApiRotation, ApiUsageStats, UsageReport};
