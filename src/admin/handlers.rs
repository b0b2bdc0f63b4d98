use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::events::{DeadLetter, DomainEvent, EventType};
use crate::http::AppState;
use crate::jobs::{EnqueueError, Job, JobStats, Queue};
use crate::resilience::CircuitStats;
use crate::security::RateLimitRule;
use crate::users::{User, UserFilter, UserPage, UserStatus};

#[derive(Serialize)]
pub struct Dashboard {
    pub version: &'static str,
    pub environment: &'static str,
    pub uptime_seconds: u64,
    pub users_by_status: std::collections::BTreeMap<String, usize>,
    pub cache: crate::cache::CacheStats,
    pub events_total: u64,
    pub events_failed: u64,
    pub dead_letters: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub queued_jobs: usize,
    pub open_circuits: Vec<String>,
    pub rate_limit_slots: usize,
}

pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    let events = state.events.stats();
    let jobs = state.jobs.stats();
    Ok(Json(Dashboard {
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config().environment.as_str(),
        uptime_seconds: state.uptime().as_secs(),
        users_by_status: state.users.count_by_status().await?,
        cache: state.cache.stats(),
        events_total: events.total_events,
        events_failed: events.failed_events,
        dead_letters: events.dead_letter_count,
        jobs_completed: jobs.completed,
        jobs_failed: jobs.failed + jobs.timed_out,
        queued_jobs: jobs.queued.values().sum(),
        open_circuits: state.breakers.open_circuits(),
        rate_limit_slots: state.rate_limiter.tracked(),
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(mut filter): Query<UserFilter>,
) -> AppResult<Json<UserPage>> {
    if filter.limit == 0 {
        filter.limit = 50;
    }
    filter.limit = filter.limit.min(500);
    Ok(Json(state.users.list_users(&filter).await?))
}

pub async fn user_detail(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = state.users.get_user(&user_id).await?;
    let profile = state.users.profile(&user_id).await?;
    let subscription = state.subscriptions.get(&user_id).await?;
    let statistics = state.users.user_statistics(&user_id).await?;
    Ok(Json(json!({
        "user": user,
        "profile": profile,
        "subscription": subscription,
        "statistics": statistics,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: UserStatus,
    pub reason: Option<String>,
    pub until: Option<DateTime<Utc>>,
}

pub async fn update_user_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> AppResult<Json<User>> {
    tracing::info!(user_id = %user_id, status = update.status.as_str(), "Admin status change");
    let user = match update.status {
        UserStatus::Active => state.users.activate(&user_id).await?,
        UserStatus::Inactive => {
            state
                .users
                .deactivate(&user_id, update.reason.as_deref())
                .await?
        }
        UserStatus::Suspended => {
            let reason = update.reason.as_deref().unwrap_or_default();
            state.users.suspend(&user_id, reason, update.until).await?
        }
        other => {
            return Err(AppError::validation(format!(
                "Status '{}' cannot be set by an administrator",
                other.as_str()
            )))
        }
    };
    Ok(Json(user))
}

pub async fn promote_to_expert(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.promote_to_expert(&user_id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheClear {
    /// Glob such as `user_profile:*`. Everything when absent.
    pub pattern: Option<String>,
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<CacheClear>,
) -> Json<Value> {
    let removed = match query.pattern.as_deref() {
        Some(pattern) => state.cache.delete_pattern(pattern),
        None => state.cache.clear(),
    };
    tracing::info!(removed, pattern = ?query.pattern, "Admin cleared cache");
    Json(json!({ "removed": removed }))
}

pub async fn rate_limit_rules(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "enabled": state.config().rate_limit.enabled,
        "rules": state.rate_limiter.rules(),
        "tracked_slots": state.rate_limiter.tracked(),
    }))
}

pub async fn add_rate_limit_rule(
    State(state): State<AppState>,
    Json(rule): Json<RateLimitRule>,
) -> AppResult<(StatusCode, Json<RateLimitRule>)> {
    if rule.requests == 0 || rule.window_secs == 0 {
        return Err(AppError::validation("requests and window_secs must be positive"));
    }
    state.rate_limiter.add_rule(rule.clone());
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn remove_rate_limit_rule(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    if state.rate_limiter.remove_rule(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("RateLimitRule", name))
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimitReset {
    pub rule: String,
    pub identifier: String,
}

pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Json(body): Json<RateLimitReset>,
) -> Json<Value> {
    let reset = state.rate_limiter.reset(&body.rule, &body.identifier);
    tracing::info!(rule = %body.rule, identifier = %body.identifier, reset, "Admin reset rate limit");
    Json(json!({ "reset": reset }))
}

pub async fn circuit_breakers(State(state): State<AppState>) -> Json<Vec<CircuitStats>> {
    Json(state.breakers.all_stats())
}

pub async fn reset_circuit_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    if state.breakers.reset(&name) {
        tracing::info!(service = %name, "Admin reset circuit breaker");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("CircuitBreaker", name))
    }
}

pub async fn reset_all_circuit_breakers(State(state): State<AppState>) -> StatusCode {
    state.breakers.reset_all();
    tracing::info!("Admin reset all circuit breakers");
    StatusCode::NO_CONTENT
}

pub async fn event_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "stats": state.events.stats(),
        "health": state.events.health(),
    }))
}

pub async fn dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter>> {
    Json(state.events.dead_letters())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplayQuery {
    pub event_type: Option<EventType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub max_events: Option<usize>,
}

pub async fn replay_events(
    State(state): State<AppState>,
    Query(query): Query<ReplayQuery>,
) -> Json<Vec<DomainEvent>> {
    let max = query.max_events.unwrap_or(100).min(1_000);
    Json(state.events.replay(query.event_type, query.from, query.to, max))
}

pub async fn job_stats(State(state): State<AppState>) -> Json<JobStats> {
    Json(state.jobs.stats())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TriggerRequest {
    pub queue: Option<Queue>,
}

pub async fn trigger_job(
    State(state): State<AppState>,
    Path(task): Path<String>,
    body: Option<Json<TriggerRequest>>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let Json(body) = body.unwrap_or_default();
    let result = match body.queue {
        Some(queue) => state.jobs.enqueue(&task, queue),
        None => state.jobs.trigger(&task),
    };
    match result {
        Ok(job) => {
            tracing::info!(task = %task, job_id = %job.id, "Admin triggered job");
            Ok((StatusCode::ACCEPTED, Json(job)))
        }
        Err(EnqueueError::UnknownTask(name)) => Err(AppError::not_found("Task", name)),
        Err(e @ EnqueueError::QueueFull(_)) => Err(AppError::ServiceUnavailable(e.to_string())),
    }
}
