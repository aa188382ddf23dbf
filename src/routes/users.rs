use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::access::{self, Role},
    models::User,
    schema::users,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    if !access::can_list_users(&user) {
        return Err(AppError::forbidden());
    }
    let mut conn = state.db()?;
    let rows: Vec<User> = users::table
        .order((users::name.asc(), users::email.asc()))
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

/// The new role shows up in the user's next access token.
pub async fn update_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<UserResponse>> {
    if !access::can_change_roles(&user) {
        return Err(AppError::forbidden());
    }
    if user_id == user.user_id {
        return Err(AppError::bad_request("you cannot change your own role"));
    }
    let role = payload.role.parse::<Role>().map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    let updated: User = diesel::update(users::table.find(user_id))
        .set((
            users::role.eq(role.as_str()),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;

    info!(target_user_id = %user_id, role = %role, changed_by = %user.user_id, "user role changed");
    Ok(Json(updated.into()))
}
