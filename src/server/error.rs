use crate::model::HuntError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by the storage layer
#[derive(Debug, Error, PartialEq)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate {field}")]
    Conflict { field: &'static str },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl From<RepositoryError> for HuntError {
    fn from(error: RepositoryError) -> Self {
        HuntError::Storage(error.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for RepositoryError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict {
                    field: constraint_field(&error.to_string()),
                }
            }
            _ => RepositoryError::Database(error.to_string()),
        }
    }
}

#[cfg(feature = "sqlite")]
fn constraint_field(message: &str) -> &'static str {
    if message.contains(".name") {
        "name"
    } else if message.contains(".code") {
        "code"
    } else {
        "key"
    }
}

/// Errors returned from HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Hunt(#[from] HuntError),

    #[error("Missing or invalid organizer token")]
    Unauthorized,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Upload exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        ApiError::Hunt(error.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Hunt(error) => hunt_status(error),
        }
    }
}

fn hunt_status(error: &HuntError) -> StatusCode {
    match error {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        HuntError::InvalidInput(_) | HuntError::MissingPhoto => StatusCode::BAD_REQUEST,
        HuntError::TimeUp => StatusCode::GONE,
        HuntError::TeamNotInLobby => StatusCode::FORBIDDEN,
        HuntError::Storage(_) | HuntError::CodeExhausted => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
