//! User management domain.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → UserService / SubscriptionService
//!         → domain rules (user.rs, subscription.rs, profile.rs)
//!         → repositories (trait, in-memory by default)
//!         → cache snapshots (profile, subscription)
//!         → EventBus (registered, login, subscription changed, ...)
//! ```

pub mod profile;
pub mod repository;
pub mod service;
pub mod subscription;
pub mod subscription_service;
pub mod user;

pub use profile::{NotificationSettings, Profile, ProfileUpdate, UserPreferences};
pub use repository::{
    InMemorySubscriptionRepository, InMemoryUserRepository, SubscriptionRepository, UserFilter,
    UserPage, UserRepository,
};
pub use service::{LoginResult, RegisterRequest, UserService, UserStatistics};
pub use subscription::{
    PaymentMethod, Subscription, SubscriptionLimits, SubscriptionStatus, SubscriptionTier,
    UsageType,
};
pub use subscription_service::{SubscriptionService, UsageSnapshot};
pub use user::{User, UserRole, UserStatus};

/// A domain rule or input check failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("{field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Rule(String),
}
