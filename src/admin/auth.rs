use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::http::AppState;

/// Require `Authorization: Bearer <admin api key>`. The key is read per
/// request so a reloaded key applies immediately.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config();
    let expected = config.admin.api_key.as_str();

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    let key_present = presented.is_some();
    let authorized = !expected.is_empty()
        && presented.is_some_and(|key| constant_time_eq(key.as_bytes(), expected.as_bytes()));

    if authorized {
        return next.run(request).await;
    }
    crate::security_event!(
        "admin_auth_failed",
        path = %request.uri().path(),
        key_present,
        "Rejected admin request"
    );
    AppError::Authentication("Invalid admin API key".into()).into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
