use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    lifecycle::access,
    notifications::{self, EmailTemplate, SaveTemplateError, TemplateKind},
    settings::{self, LifecycleSettings},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub subject: String,
    pub body: String,
}

fn require_settings_access(user: &AuthenticatedUser) -> AppResult<()> {
    if access::can_update_settings(user) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

fn parse_kind(raw: &str) -> AppResult<TemplateKind> {
    raw.parse::<TemplateKind>().map_err(|_| AppError::not_found())
}

pub async fn get_settings(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<LifecycleSettings>> {
    let mut conn = state.db()?;
    Ok(Json(state.lifecycle_settings(&mut conn)?))
}

/// Existing notes keep the deadline they were created with.
pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<LifecycleSettings>,
) -> AppResult<Json<LifecycleSettings>> {
    require_settings_access(&user)?;
    payload.validate()?;

    let mut conn = state.db()?;
    let saved = settings::update(&mut conn, payload)?;
    info!(
        deadline_days = saved.deadline_days,
        reminder_frequency_days = saved.reminder_frequency_days,
        user_id = %user.user_id,
        "settings updated"
    );
    Ok(Json(saved))
}

pub async fn list_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<EmailTemplate>>> {
    require_settings_access(&user)?;
    let mut conn = state.db()?;
    Ok(Json(notifications::list_templates(&mut conn)?))
}

pub async fn get_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
) -> AppResult<Json<EmailTemplate>> {
    require_settings_access(&user)?;
    let kind = parse_kind(&kind)?;
    let mut conn = state.db()?;
    Ok(Json(notifications::load_template(&mut conn, kind)?))
}

pub async fn save_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<String>,
    Json(payload): Json<TemplateRequest>,
) -> AppResult<Json<EmailTemplate>> {
    require_settings_access(&user)?;
    let kind = parse_kind(&kind)?;
    let mut conn = state.db()?;

    match notifications::save_template(&mut conn, kind, &payload.subject, &payload.body) {
        Ok(template) => {
            info!(template = %kind, user_id = %user.user_id, "email template saved");
            Ok(Json(template))
        }
        Err(SaveTemplateError::Validation(errors)) => Err(errors.into()),
        Err(SaveTemplateError::Database(err)) => Err(err.into()),
    }
}
