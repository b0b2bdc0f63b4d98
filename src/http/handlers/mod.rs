//! Route handlers for `/api/v1`.

pub mod auth;
pub mod integrations;
pub mod subscriptions;
pub mod system;
pub mod users;

use axum::{
    routing::{any, get, post},
    Router,
};

use crate::http::AppState;

pub fn api_v1() -> Router<AppState> {
    let mut router = Router::new()
        .route("/", get(system::api_root))
        .route("/status", get(system::status))
        .route("/version", get(system::version))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/users/me", get(users::me))
        .route("/users/me/statistics", get(users::statistics))
        .route(
            "/users/me/profile",
            get(users::profile).patch(users::update_profile),
        )
        .route("/users/me/plant-slots", get(users::plant_slots))
        .route("/users/me/plant-count", axum::routing::put(users::update_plant_count))
        .route("/subscriptions/me", get(subscriptions::me))
        .route("/subscriptions/me/trial", post(subscriptions::start_trial))
        .route("/subscriptions/me/upgrade", post(subscriptions::upgrade))
        .route("/subscriptions/me/cancel", post(subscriptions::cancel))
        .route("/subscriptions/me/reactivate", post(subscriptions::reactivate))
        .route("/subscriptions/me/usage/{usage_type}", post(subscriptions::track_usage))
        .route("/integrations/{service}/provider", get(integrations::provider))
        .route("/integrations/usage", get(integrations::usage))
        .route("/integrations/calls", post(integrations::record_call));

    for module in system::PLACEHOLDER_MODULES {
        let handler = move || async move { system::module_placeholder(module) };
        router = router
            .route(&format!("/{module}"), any(handler))
            .route(&format!("/{module}/{{*rest}}"), any(handler));
    }
    router
}
