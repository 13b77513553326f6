use super::payload;
use crate::model::{AnswerResult, HuntError, LobbyId, QuestionId, RaceId, TeamRaceProgress};
use crate::server::{ApiError, AppState, PhotoResult, QuestionView};
use axum::body::{self, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub team_code: String,
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhotoQuery {
    #[serde(default)]
    pub team_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionIndexRequest {
    pub team_code: String,
    pub race_id: RaceId,
    pub question_index: usize,
}

pub async fn question_view(
    State(state): State<AppState>,
    Path((lobby_id, question_id)): Path<(LobbyId, QuestionId)>,
) -> Result<Json<QuestionView>, ApiError> {
    Ok(Json(
        state.service.question_view(lobby_id, question_id).await?,
    ))
}

pub async fn check_answer(
    State(state): State<AppState>,
    Path((lobby_id, question_id)): Path<(LobbyId, QuestionId)>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResult>, ApiError> {
    let AnswerRequest { team_code, answer } = payload(body)?;
    let result = state
        .service
        .check_answer(lobby_id, question_id, &team_code, &answer)
        .await?;
    Ok(Json(result))
}

/// A single uploaded image, with the team code when the form carried one.
struct Photo {
    team_code: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

/// Accepts either a raw image body or a `multipart/form-data` form with a
/// `photo` file field and an optional `team_code` field.
pub async fn upload_photo(
    State(state): State<AppState>,
    Path((lobby_id, question_id)): Path<(LobbyId, QuestionId)>,
    Query(query): Query<PhotoQuery>,
    request: Request,
) -> Result<(StatusCode, Json<PhotoResult>), ApiError> {
    let limit = state.config.max_upload_bytes;
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let photo = match content_type.as_deref() {
        Some(ct) if ct.starts_with("multipart/form-data") => {
            let multipart = Multipart::from_request(request, &state)
                .await
                .map_err(|e| ApiError::MalformedPayload(e.body_text()))?;
            read_multipart(multipart, limit).await?
        }
        _ => Photo {
            team_code: None,
            content_type,
            bytes: body::to_bytes(request.into_body(), limit)
                .await
                .map_err(|_| ApiError::PayloadTooLarge(limit))?,
        },
    };
    debug!(size = photo.bytes.len(), content_type = ?photo.content_type, "Photo received");

    let team_code = photo
        .team_code
        .or(query.team_code)
        .ok_or_else(|| HuntError::invalid("team_code is required"))?;
    let result = state
        .service
        .upload_photo(
            lobby_id,
            question_id,
            &team_code,
            photo.content_type.as_deref(),
            &photo.bytes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn read_multipart(mut multipart: Multipart, limit: usize) -> Result<Photo, ApiError> {
    let mut photo = Photo {
        team_code: None,
        content_type: None,
        bytes: Bytes::new(),
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        match field.name() {
            Some("team_code") => {
                photo.team_code = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            Some("photo") => {
                photo.content_type = field.content_type().map(str::to_string);
                photo.bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                if photo.bytes.len() > limit {
                    return Err(ApiError::PayloadTooLarge(limit));
                }
            }
            _ => {}
        }
    }
    Ok(photo)
}

fn multipart_error(error: MultipartError, limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::MalformedPayload(error.body_text())
    }
}

pub async fn save_question_index(
    State(state): State<AppState>,
    body: Result<Json<QuestionIndexRequest>, JsonRejection>,
) -> Result<Json<TeamRaceProgress>, ApiError> {
    let QuestionIndexRequest {
        team_code,
        race_id,
        question_index,
    } = payload(body)?;
    let progress = state
        .service
        .save_question_index(&team_code, race_id, question_index)
        .await?;
    Ok(Json(progress))
}
