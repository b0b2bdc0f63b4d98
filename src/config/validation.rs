//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics and returns every
//! problem found, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{AppConfig, DEFAULT_JWT_SECRET};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.server.max_body_size == 0 {
        errors.push(ValidationError::new("server.max_body_size", "must be > 0"));
    }
    for origin in &config.server.cors_origins {
        if origin != "*" && url::Url::parse(origin).is_err() {
            errors.push(ValidationError::new(
                "server.cors_origins",
                format!("'{origin}' is not a valid origin"),
            ));
        }
    }

    let secret = &config.security.jwt_secret;
    if secret.is_empty() {
        errors.push(ValidationError::new("security.jwt_secret", "must not be empty"));
    } else if config.environment.is_production() {
        if secret == DEFAULT_JWT_SECRET {
            errors.push(ValidationError::new(
                "security.jwt_secret",
                "default secret is not allowed in production",
            ));
        } else if secret.len() < 32 {
            errors.push(ValidationError::new(
                "security.jwt_secret",
                "must be at least 32 bytes in production",
            ));
        }
    }
    if config.security.access_token_expire_minutes <= 0 {
        errors.push(ValidationError::new(
            "security.access_token_expire_minutes",
            "must be > 0",
        ));
    }
    if config.security.refresh_token_expire_minutes <= config.security.access_token_expire_minutes
    {
        errors.push(ValidationError::new(
            "security.refresh_token_expire_minutes",
            "must exceed the access token lifetime",
        ));
    }
    if config.security.password.min_length < 6 {
        errors.push(ValidationError::new("security.password.min_length", "must be >= 6"));
    }

    let mut rule_names = HashSet::new();
    for rule in &config.rate_limit.rules {
        let field = format!("rate_limit.rules[{}]", rule.name);
        if rule.name.is_empty() {
            errors.push(ValidationError::new("rate_limit.rules", "rule name must not be empty"));
        }
        if !rule_names.insert(rule.name.as_str()) {
            errors.push(ValidationError::new(field.clone(), "duplicate rule name"));
        }
        if rule.requests == 0 {
            errors.push(ValidationError::new(field.clone(), "requests must be > 0"));
        }
        if rule.window_secs == 0 {
            errors.push(ValidationError::new(field, "window_secs must be > 0"));
        }
    }

    for (name, cb) in &config.circuit_breakers {
        let field = format!("circuit_breakers.{name}");
        if cb.failure_threshold == 0 || cb.success_threshold == 0 {
            errors.push(ValidationError::new(field.clone(), "thresholds must be > 0"));
        }
        if cb.recovery_timeout_secs == 0 {
            errors.push(ValidationError::new(field, "recovery_timeout_secs must be > 0"));
        }
    }

    if config.event_bus.max_stream_length == 0 {
        errors.push(ValidationError::new("event_bus.max_stream_length", "must be > 0"));
    }

    if config.jobs.worker_concurrency == 0 {
        errors.push(ValidationError::new("jobs.worker_concurrency", "must be >= 1"));
    }
    if config.jobs.queue_capacity == 0 {
        errors.push(ValidationError::new("jobs.queue_capacity", "must be >= 1"));
    }
    let mut job_names = HashSet::new();
    for job in &config.jobs.schedule {
        if !job_names.insert(job.name.as_str()) {
            errors.push(ValidationError::new(
                format!("jobs.schedule[{}]", job.name),
                "duplicate job name",
            ));
        }
        if let Err(message) = job.schedule.validate() {
            errors.push(ValidationError::new(format!("jobs.schedule[{}]", job.name), message));
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }

    if config.admin.enabled && config.admin.api_key.len() < 8 {
        errors.push(ValidationError::new("admin.api_key", "must be at least 8 characters"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use crate::security::rate_limit::{Algorithm, RateLimitRule, Scope};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.jobs.worker_concurrency = 0;
        config.observability.log_level = "verbose".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "server.bind_address"));
        assert!(errors.iter().any(|e| e.field == "jobs.worker_concurrency"));
        assert!(errors.iter().any(|e| e.field == "observability.log_level"));
    }

    #[test]
    fn test_production_rejects_default_secret() {
        let mut config = AppConfig::default();
        config.environment = Environment::Production;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "security.jwt_secret"));

        config.security.jwt_secret = "x".repeat(48);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rule_validation() {
        let mut config = AppConfig::default();
        let rule = RateLimitRule::new("custom", 0, 60, Algorithm::FixedWindow, Scope::Ip);
        config.rate_limit.rules = vec![rule.clone(), rule];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message == "duplicate rule name"));
        assert!(errors.iter().any(|e| e.message == "requests must be > 0"));
    }
}
