//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "PLANT_CARE_";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { key: String, message: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { key, message } => write!(f, "Invalid {}: {}", key, message),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file, apply environment overrides, validate.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: AppConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
    finalize(config)
}

/// Build configuration from defaults plus environment when no file is given.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    finalize(AppConfig::default())
}

fn finalize(mut config: AppConfig) -> Result<AppConfig, ConfigError> {
    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `PLANT_CARE_*` overrides. Unknown keys are ignored.
pub fn apply_env_overrides<I>(config: &mut AppConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match name {
            "ENV" => {
                config.environment = value
                    .parse()
                    .map_err(|message| ConfigError::Env { key: key.clone(), message })?;
            }
            "BIND_ADDRESS" => config.server.bind_address = value,
            "LOG_LEVEL" => config.observability.log_level = value,
            "LOG_FORMAT" => config.observability.log_format = value,
            "JWT_SECRET" => config.security.jwt_secret = value,
            "ADMIN_API_KEY" => {
                config.admin.api_key = value;
                config.admin.enabled = true;
            }
            "CORS_ORIGINS" => {
                config.server.cors_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "RATE_LIMIT_ENABLED" => config.rate_limit.enabled = parse_bool(&key, &value)?,
            "JOBS_ENABLED" => config.jobs.enabled = parse_bool(&key, &value)?,
            "WORKER_CONCURRENCY" => {
                config.jobs.worker_concurrency =
                    value.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
            }
            _ => {
                tracing::debug!(key = %key, "Ignoring unknown configuration override");
            }
        }
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            vars(&[
                ("PLANT_CARE_ENV", "testing"),
                ("PLANT_CARE_BIND_ADDRESS", "127.0.0.1:9000"),
                ("PLANT_CARE_CORS_ORIGINS", "https://a.example, https://b.example"),
                ("PLANT_CARE_RATE_LIMIT_ENABLED", "off"),
                ("PLANT_CARE_ADMIN_API_KEY", "secret"),
                ("UNRELATED", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Testing);
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.server.cors_origins.len(), 2);
        assert!(!config.rate_limit.enabled);
        assert!(config.admin.enabled);
        assert_eq!(config.admin.api_key, "secret");
    }

    #[test]
    fn test_env_override_rejects_bad_values() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, vars(&[("PLANT_CARE_JOBS_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("PLANT_CARE_JOBS_ENABLED"));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "testing"

[server]
bind_address = "127.0.0.1:8123"

[[rate_limit.rules]]
name = "plant_creation"
requests = 20
window_secs = 3600
algorithm = "sliding_window"
scope = "user"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8123");
        assert_eq!(config.rate_limit.rules.len(), 1);
        assert_eq!(config.rate_limit.rules[0].requests, 20);
        // Untouched sections keep their defaults.
        assert_eq!(config.cache.ttl_user_data_secs, 300);
        assert!(!config.jobs.schedule.is_empty());
    }

    #[test]
    fn test_load_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = 5").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }
}
