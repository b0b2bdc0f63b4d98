//! Application error taxonomy.
//!
//! Every subsystem error converges on [`AppError`], which renders as
//! `{"error": {"code", "message", "details"}}` with the status of its variant.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::security::rate_limit::RateLimitDecision;
use crate::users::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("{0}")]
    Authorization(String),

    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource} already exists: {identifier}")]
    AlreadyExists {
        resource: &'static str,
        identifier: String,
    },

    #[error("{0}")]
    BusinessRule(String),

    #[error("Usage limit exceeded for {usage_type}: {current}/{limit}")]
    UsageLimitExceeded {
        usage_type: String,
        current: u64,
        limit: u64,
    },

    #[error("Too many requests. Please try again later.")]
    RateLimited(Box<RateLimitDecision>),

    #[error("External API '{api}' failed: {message}")]
    ExternalApi { api: String, message: String },

    #[error("Service '{0}' is temporarily unavailable")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) | AppError::TokenExpired | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Authorization(_) | AppError::UsageLimitExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::AlreadyExists { .. } => StatusCode::CONFLICT,
            AppError::BusinessRule(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::Authorization(_) => "AUTHORIZATION_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::AlreadyExists { .. } => "RESOURCE_ALREADY_EXISTS",
            AppError::BusinessRule(_) => "BUSINESS_LOGIC_ERROR",
            AppError::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            AppError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            AppError::ExternalApi { .. } => "EXTERNAL_API_ERROR",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Value {
        match self {
            AppError::Validation { errors, .. } if !errors.is_empty() => {
                json!({ "errors": errors })
            }
            AppError::NotFound { resource, id } => {
                json!({ "resource_type": resource, "resource_id": id })
            }
            AppError::AlreadyExists {
                resource,
                identifier,
            } => json!({ "resource_type": resource, "identifier": identifier }),
            AppError::UsageLimitExceeded {
                usage_type,
                current,
                limit,
            } => json!({ "limit_type": usage_type, "current_usage": current, "limit": limit }),
            AppError::RateLimited(decision) => json!({
                "limit": decision.limit,
                "current_usage": decision.current_usage,
                "retry_after": decision.retry_after,
            }),
            AppError::ExternalApi { api, .. } => json!({ "api_name": api }),
            AppError::ServiceUnavailable(service) => json!({ "service_name": service }),
            _ => json!({}),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "details": self.details(),
            }
        }));

        let mut response = (status, body).into_response();
        if let AppError::RateLimited(decision) = &self {
            let headers = response.headers_mut();
            for (name, value) in decision.headers() {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    headers.insert(name, value);
                }
            }
        }
        response
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidInput { field, message } => AppError::Validation {
                message: format!("Invalid value for {field}"),
                errors: vec![message],
            },
            DomainError::Rule(message) => AppError::BusinessRule(message),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::not_found("User", "abc").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::UsageLimitExceeded {
                usage_type: "ai_chat_messages".into(),
                current: 10,
                limit: 10
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::ServiceUnavailable("weather_api".into()).code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_domain_error_conversion() {
        let err: AppError = DomainError::Rule("Free tier limited to 5 plants".into()).into();
        assert_eq!(err.code(), "BUSINESS_LOGIC_ERROR");

        let err: AppError = DomainError::InvalidInput {
            field: "email",
            message: "Invalid email format".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
