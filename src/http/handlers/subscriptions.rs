//! The caller's subscription and usage.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::users::subscription::DEFAULT_TRIAL_DAYS;
use crate::users::{Subscription, SubscriptionTier, UsageSnapshot, UsageType};

#[derive(Debug, Deserialize)]
pub struct TrialRequest {
    pub tier: SubscriptionTier,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub immediate: bool,
}

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    #[serde(default = "one")]
    pub amount: u32,
}

fn one() -> u32 {
    1
}

pub async fn me(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Value>> {
    let sub = state.subscriptions.get(&caller.user_id).await?;
    let usage: Vec<UsageSnapshot> = UsageType::ALL
        .iter()
        .map(|t| UsageSnapshot {
            usage_type: *t,
            used: sub.usage(*t),
            remaining: sub.usage_remaining(*t),
        })
        .collect();
    Ok(Json(json!({
        "subscription": sub,
        "usage": usage,
        "days_until_renewal": sub.days_until_renewal(),
    })))
}

pub async fn start_trial(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<TrialRequest>,
) -> AppResult<Json<Subscription>> {
    let days = request.days.unwrap_or(DEFAULT_TRIAL_DAYS);
    Ok(Json(
        state
            .subscriptions
            .start_trial(&caller.user_id, request.tier, days)
            .await?,
    ))
}

pub async fn upgrade(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<UpgradeRequest>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(
        state.subscriptions.upgrade(&caller.user_id, request.tier).await?,
    ))
}

pub async fn cancel(
    State(state): State<AppState>,
    caller: AuthUser,
    request: Option<Json<CancelRequest>>,
) -> AppResult<Json<Subscription>> {
    let Json(request) = request.unwrap_or_default();
    Ok(Json(
        state
            .subscriptions
            .cancel(&caller.user_id, request.reason, request.immediate)
            .await?,
    ))
}

pub async fn reactivate(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<Subscription>> {
    Ok(Json(state.subscriptions.reactivate(&caller.user_id).await?))
}

pub async fn track_usage(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(usage_type): Path<String>,
    Json(request): Json<UsageRequest>,
) -> AppResult<Json<UsageSnapshot>> {
    let usage: UsageType = usage_type.parse().map_err(|e: String| AppError::Validation {
        message: "Unknown usage type".into(),
        errors: vec![e],
    })?;
    Ok(Json(
        state
            .subscriptions
            .track_usage(&caller.user_id, usage, request.amount)
            .await?,
    ))
}
