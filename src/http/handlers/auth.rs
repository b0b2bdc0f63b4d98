//! Registration, login and token refresh.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::http::middleware::{enforce, AuthUser, ClientIp};
use crate::http::AppState;
use crate::security::TokenPair;
use crate::users::RegisterRequest;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    enforce(&state, "auth_register", &ip)?;
    let user = state.users.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": user,
            "message": "Registration successful. Please verify your email.",
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    enforce(&state, "auth_login", &ip)?;
    let result = state.users.login(&request.email, &request.password).await?;
    Ok(Json(json!({
        "user": result.user,
        "access_token": result.tokens.access_token,
        "refresh_token": result.tokens.refresh_token,
        "token_type": result.tokens.token_type,
        "expires_in": result.tokens.expires_in,
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    Ok(Json(state.users.refresh(&request.refresh_token).await?))
}

pub async fn verify_email(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<Value>> {
    let user = state.users.verify_email(&caller.user_id).await?;
    Ok(Json(json!({ "user": user, "message": "Email verified" })))
}
