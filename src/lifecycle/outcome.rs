use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::{auth::jwt::TokenError, error::AppError, validation::ValidationErrors};

const SERVER_ERROR_MESSAGE: &str = "server error, please try again";

/// Uniform body of every lifecycle action, successful or not.
#[derive(Debug, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<Uuid>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            errors: None,
            note_id: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: None,
            note_id: None,
        }
    }

    pub fn with_note(mut self, note_id: Uuid) -> Self {
        self.note_id = Some(note_id);
        self
    }
}

pub type ActionResponse = (StatusCode, Json<ActionResult>);

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid input")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("note not found")]
    NotFound,
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("dependency failure: {0}")]
    Dependency(#[from] anyhow::Error),
    #[error("database failure: {0}")]
    Database(diesel::result::Error),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

impl TransitionError {
    pub fn forbidden() -> Self {
        TransitionError::Forbidden("you are not allowed to perform this action".into())
    }

    pub fn not_pending() -> Self {
        TransitionError::InvalidState("note is no longer pending attestation".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TransitionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TransitionError::Forbidden(_) => StatusCode::FORBIDDEN,
            TransitionError::Token(_) => StatusCode::UNAUTHORIZED,
            TransitionError::NotFound => StatusCode::NOT_FOUND,
            TransitionError::InvalidState(_) | TransitionError::Duplicate(_) => {
                StatusCode::CONFLICT
            }
            TransitionError::Dependency(_) | TransitionError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_action_result(&self) -> ActionResult {
        match self {
            TransitionError::Validation(errors) => ActionResult {
                errors: Some(errors.fields().clone()),
                ..ActionResult::failed(errors.summary())
            },
            TransitionError::Dependency(_) | TransitionError::Database(_) => {
                ActionResult::failed(SERVER_ERROR_MESSAGE)
            }
            other => ActionResult::failed(other.to_string()),
        }
    }
}

impl From<diesel::result::Error> for TransitionError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => TransitionError::NotFound,
            other => TransitionError::Database(other),
        }
    }
}

impl From<ValidationErrors> for TransitionError {
    fn from(value: ValidationErrors) -> Self {
        TransitionError::Validation(value)
    }
}

impl From<AppError> for TransitionError {
    fn from(value: AppError) -> Self {
        match value.status() {
            StatusCode::NOT_FOUND => TransitionError::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TransitionError::Forbidden(value.message().to_string())
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let mut errors = ValidationErrors::default();
                for (field, message) in value.fields().into_iter().flatten() {
                    errors.add(field, message.clone());
                }
                if errors.is_empty() {
                    errors.add("request", value.message());
                }
                TransitionError::Validation(errors)
            }
            StatusCode::BAD_REQUEST => {
                TransitionError::Validation(ValidationErrors::single("request", value.message()))
            }
            _ => TransitionError::Dependency(anyhow::anyhow!(value.message().to_string())),
        }
    }
}

impl IntoResponse for TransitionError {
    fn into_response(self) -> Response {
        if let TransitionError::Dependency(err) = &self {
            error!(error = ?err, "note action failed on a dependency");
        }
        if let TransitionError::Database(err) = &self {
            error!(error = %err, "note action failed on the database");
        }
        (self.status(), Json(self.to_action_result())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_failures_hide_details() {
        let err = TransitionError::Dependency(anyhow::anyhow!("s3 exploded: key=abc"));
        let result = err.to_action_result();
        assert!(!result.success);
        assert_eq!(result.message, SERVER_ERROR_MESSAGE);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn state_errors_explain_why() {
        let err = TransitionError::not_pending();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_action_result().message,
            "note is no longer pending attestation"
        );
    }

    #[test]
    fn validation_errors_are_reported_per_field() {
        let mut errors = ValidationErrors::default();
        errors.add("amount", "amount must be a positive value");
        errors.add("coordinator_email", "invalid email address");
        let result = TransitionError::from(errors).to_action_result();
        let fields = result.errors.expect("field errors");
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("amount"));
    }

    #[test]
    fn expired_and_invalid_tokens_read_differently() {
        let expired = TransitionError::from(TokenError::Expired).to_action_result();
        let invalid = TransitionError::from(TokenError::Invalid).to_action_result();
        assert_ne!(expired.message, invalid.message);
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = TransitionError::from(diesel::result::Error::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
