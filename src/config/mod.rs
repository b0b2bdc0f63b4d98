//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, PLANT_CARE_* env overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated)
//!     → shared via ArcSwap in the application state
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → server swaps the config and reloads rate-limit rules
//! ```
//!
//! Token secrets and listener settings are read once at startup; a reload
//! does not rebind or re-key.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AdminConfig, ApiRotationConfig, AppConfig, CacheConfig, CircuitBreakerSettings,
    Environment, EventBusConfig, HealthConfig, JobsConfig, ObservabilityConfig,
    PasswordPolicyConfig, RateLimitConfig, SecurityConfig, ServerConfig,
};
