//! Third-party provider selection and usage.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::integrations::{ApiCallOutcome, ApiProvider, ApiTier, ServiceType, UsageReport};
use crate::security::UserTier;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderQuery {
    /// Comma-separated provider names to skip.
    pub exclude: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UsageQuery {
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallReport {
    pub provider: String,
    #[serde(flatten)]
    pub outcome: ApiCallOutcome,
}

fn api_tier(tier: UserTier) -> ApiTier {
    match tier {
        UserTier::Free => ApiTier::Free,
        _ => ApiTier::Premium,
    }
}

fn invalid(message: &str, error: String) -> AppError {
    AppError::Validation {
        message: message.to_string(),
        errors: vec![error],
    }
}

pub async fn provider(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(service): Path<String>,
    Query(query): Query<ProviderQuery>,
) -> AppResult<Json<Value>> {
    let service: ServiceType = service
        .parse()
        .map_err(|e| invalid("Unknown service type", e))?;
    let exclude = query
        .exclude
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ApiProvider>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid("Unknown provider", e))?;

    let tier = api_tier(caller.tier);
    let Some(primary) = state
        .rotation
        .best_provider(service, &caller.user_id, tier, &exclude)
    else {
        return Err(AppError::ServiceUnavailable(service.as_str().to_string()));
    };
    let fallbacks = state
        .rotation
        .fallback_providers(service, &caller.user_id, tier, Some(primary));

    Ok(Json(json!({
        "service": service,
        "provider": primary,
        "fallbacks": fallbacks,
        "daily_usage": state.rotation.daily_usage(primary, &caller.user_id),
        "daily_limit": primary.limits().daily_limit(tier),
    })))
}

pub async fn usage(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<UsageQuery>,
) -> AppResult<Json<UsageReport>> {
    let service = query
        .service
        .as_deref()
        .map(str::parse::<ServiceType>)
        .transpose()
        .map_err(|e| invalid("Unknown service type", e))?;
    Ok(Json(state.rotation.usage_report(&caller.user_id, service)))
}

/// Record the outcome of a call the client made through a selected provider.
pub async fn record_call(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(report): Json<CallReport>,
) -> AppResult<StatusCode> {
    let provider: ApiProvider = report
        .provider
        .parse()
        .map_err(|e| invalid("Unknown provider", e))?;
    state
        .rotation
        .record_usage(provider, &caller.user_id, &report.outcome);
    Ok(StatusCode::NO_CONTENT)
}
