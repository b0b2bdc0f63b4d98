//! Operator API, mounted under `/admin` when enabled.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/{user_id}", get(user_detail))
        .route("/users/{user_id}/status", put(update_user_status))
        .route("/users/{user_id}/promote-expert", post(promote_to_expert))
        .route("/cache", delete(clear_cache))
        .route("/rate-limits", get(rate_limit_rules))
        .route("/rate-limits/rules", post(add_rate_limit_rule))
        .route("/rate-limits/rules/{name}", delete(remove_rate_limit_rule))
        .route("/rate-limits/reset", post(reset_rate_limit))
        .route("/circuit-breakers", get(circuit_breakers))
        .route("/circuit-breakers/reset", post(reset_all_circuit_breakers))
        .route("/circuit-breakers/{name}/reset", post(reset_circuit_breaker))
        .route("/events", get(event_stats))
        .route("/events/dead-letters", get(dead_letters))
        .route("/events/replay", get(replay_events))
        .route("/jobs", get(job_stats))
        .route("/jobs/{task}/trigger", post(trigger_job))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
