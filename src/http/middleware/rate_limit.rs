//! Per-client request limiting for the API surface.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::http::middleware::client_ip::client_ip;
use crate::http::AppState;
use crate::security::{RateLimitDecision, UserTier};

/// Rule applied to every `/api` request, keyed by client address.
pub const GLOBAL_RULE: &str = "ip_global";

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config();
    if !config.rate_limit.enabled {
        return next.run(request).await;
    }

    let ip = client_ip(
        request.headers(),
        request.extensions(),
        config.server.trust_forwarded_headers,
    );
    let decision = state
        .rate_limiter
        .check(GLOBAL_RULE, &ip, UserTier::Free, None, None);
    if !decision.allowed {
        tracing::info!(client_ip = %ip, path = %request.uri().path(), "Request rate limited");
        return AppError::RateLimited(Box::new(decision)).into_response();
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}

/// Check `rule` for `identifier`, failing with a 429 error when denied.
pub fn enforce(state: &AppState, rule: &str, identifier: &str) -> Result<(), AppError> {
    if !state.config().rate_limit.enabled {
        return Ok(());
    }
    let decision = state
        .rate_limiter
        .check(rule, identifier, UserTier::Free, None, None);
    if decision.allowed {
        Ok(())
    } else {
        Err(AppError::RateLimited(Box::new(decision)))
    }
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    if decision.limit == 0 {
        return;
    }
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
