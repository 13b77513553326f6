//! JSON handlers for the HTTP API. Each one unpacks the request, calls
//! [`HuntService`](crate::server::HuntService) and lets [`ApiError`] shape failures.

pub mod gameplay;
pub mod health;
pub mod leaderboard;
pub mod lobbies;
pub mod races;
pub mod teams;

use super::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::Json;

/// Unwraps a JSON body, turning axum's rejection into our error shape.
pub(crate) fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(body) = payload?;
    Ok(body)
}
