//! The caller's own account.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::http::middleware::AuthUser;
use crate::http::AppState;
use crate::users::{Profile, ProfileUpdate, User, UserStatistics};

#[derive(Debug, Deserialize)]
pub struct PlantCountUpdate {
    pub count: u32,
}

pub async fn me(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<User>> {
    Ok(Json(state.users.get_user(&caller.user_id).await?))
}

pub async fn statistics(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<UserStatistics>> {
    Ok(Json(state.users.user_statistics(&caller.user_id).await?))
}

pub async fn profile(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Profile>> {
    caller.require("profile", "read")?;
    Ok(Json(state.users.profile(&caller.user_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    caller.require("profile", "update")?;
    Ok(Json(state.users.update_profile(&caller.user_id, update).await?))
}

pub async fn plant_slots(State(state): State<AppState>, caller: AuthUser) -> AppResult<Json<Value>> {
    let user = state.users.get_user(&caller.user_id).await?;
    Ok(Json(json!({
        "plant_count": user.plant_count,
        "remaining_plant_slots": user.remaining_plant_slots(),
        "can_add_plant": user.can_add_plant(),
        "is_premium": user.is_premium,
    })))
}

pub async fn update_plant_count(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(body): Json<PlantCountUpdate>,
) -> AppResult<Json<User>> {
    Ok(Json(
        state
            .users
            .update_plant_count(&caller.user_id, body.count)
            .await?,
    ))
}
