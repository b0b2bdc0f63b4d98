//! Bearer token authentication for user endpoints.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::http::AppState;
use crate::security::permissions::check_permission;
use crate::security::{TokenKind, UserTier};

/// The caller of an authenticated request, taken from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    /// Permission-matrix role, e.g. "premium_user".
    pub role: String,
    pub tier: UserTier,
}

impl AuthUser {
    pub fn can(&self, resource: &str, action: &str) -> bool {
        check_permission(&self.role, resource, action)
    }

    /// Fail with 403 unless the role may perform `action` on `resource`.
    pub fn require(&self, resource: &str, action: &str) -> Result<(), AppError> {
        if self.can(resource, action) {
            Ok(())
        } else {
            crate::security_event!(
                "permission_denied",
                user_id = %self.user_id,
                role = %self.role,
                resource,
                action,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "Role '{}' may not {action} {resource}",
                self.role
            )))
        }
    }
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Authentication("Missing bearer token".into()))?;
        let claims = state.tokens.verify(token, TokenKind::Access)?;
        Ok(AuthUser {
            tier: claims.tier.parse().unwrap_or_default(),
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}
