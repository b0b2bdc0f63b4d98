//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::jobs::{default_beat_schedule, JobSpec};
use crate::security::rate_limit::RateLimitRule;

/// Placeholder secret shipped in defaults. Rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production-plant-care-secret";

/// Root configuration for the plant care service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment.
    pub environment: Environment,

    /// HTTP listener and request handling.
    pub server: ServerConfig,

    /// Token and password settings.
    pub security: SecurityConfig,

    /// Rate limiting rules.
    pub rate_limit: RateLimitConfig,

    /// Cache TTLs and maintenance.
    pub cache: CacheConfig,

    /// Per-service circuit breaker overrides keyed by service name.
    pub circuit_breakers: HashMap<String, CircuitBreakerSettings>,

    /// External API rotation.
    pub api_rotation: ApiRotationConfig,

    /// Internal event bus.
    pub event_bus: EventBusConfig,

    /// Background jobs (worker pool and periodic schedule).
    pub jobs: JobsConfig,

    /// Health probe settings.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API.
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Testing,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }

    pub fn is_testing(&self) -> bool {
        *self == Environment::Testing
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Allowed CORS origins. Empty disables CORS headers.
    pub cors_origins: Vec<String>,

    /// Use X-Forwarded-For / X-Real-IP for the client address.
    /// Only enable behind a trusted reverse proxy.
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
            cors_origins: vec!["http://localhost:3000".to_string()],
            trust_forwarded_headers: false,
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC secret for access and refresh tokens.
    pub jwt_secret: String,

    /// Access token lifetime in minutes.
    pub access_token_expire_minutes: i64,

    /// Refresh token lifetime in minutes.
    pub refresh_token_expire_minutes: i64,

    /// Password policy.
    pub password: PasswordPolicyConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_minutes: 60 * 24 * 7,
            password: PasswordPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordPolicyConfig {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_symbols: true,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Extra or overriding rules, merged over the built-in rule set by name.
    pub rules: Vec<RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

/// Cache configuration (TTLs in seconds).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_plant_library_secs: u64,
    pub ttl_weather_data_secs: u64,
    pub ttl_api_response_secs: u64,
    pub ttl_user_data_secs: u64,
    pub ttl_care_schedule_secs: u64,

    /// Interval of the expired-entry sweep.
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_plant_library_secs: 86_400,
            ttl_weather_data_secs: 3_600,
            ttl_api_response_secs: 1_800,
            ttl_user_data_secs: 300,
            ttl_care_schedule_secs: 3_600,
            purge_interval_secs: 60,
        }
    }
}

/// Circuit breaker override for one service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
    pub timeout_secs: u64,
}

/// External API rotation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiRotationConfig {
    /// Consecutive failures before a provider is marked unhealthy.
    pub unhealthy_after_failures: u32,

    /// TTL of cached provider statistics.
    pub stats_ttl_secs: u64,

    /// TTL of per-user daily usage counters.
    pub usage_ttl_secs: u64,
}

impl Default for ApiRotationConfig {
    fn default() -> Self {
        Self {
            unhealthy_after_failures: 3,
            stats_ttl_secs: 86_400,
            usage_ttl_secs: 86_400,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dead_letter_queue: bool,
    pub persistence_enabled: bool,
    pub max_stream_length: usize,
    pub handler_timeout_secs: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            dead_letter_queue: true,
            persistence_enabled: true,
            max_stream_length: 10_000,
            handler_timeout_secs: 30,
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Run the periodic scheduler.
    pub enabled: bool,

    /// Maximum concurrently running tasks.
    pub worker_concurrency: usize,

    /// Hard time limit per task run.
    pub task_time_limit_secs: u64,

    /// Capacity of each priority queue.
    pub queue_capacity: usize,

    /// Periodic schedule.
    pub schedule: Vec<JobSpec>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_concurrency: 4,
            task_time_limit_secs: 300,
            queue_capacity: 1_000,
            schedule: default_beat_schedule(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Startup probe reports "starting" until this much uptime.
    pub minimum_startup_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            minimum_startup_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Serve Prometheus metrics at /metrics.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API under /admin.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
