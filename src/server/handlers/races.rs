use super::payload;
use crate::model::{
    NewRace, PublicQuestion, Question, QuestionId, QuestionInput, Race, RaceId, RaceStatus,
    RaceUpdate, Zone, ZoneId, ZoneInput,
};
use crate::server::{ApiError, AppState};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

const ORGANIZER: &str = "organizer";

#[derive(Debug, Default, Deserialize)]
pub struct RaceListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn create_race(
    State(state): State<AppState>,
    body: Result<Json<NewRace>, JsonRejection>,
) -> Result<(StatusCode, Json<Race>), ApiError> {
    let race = state.service.create_race(payload(body)?, ORGANIZER).await?;
    Ok((StatusCode::CREATED, Json(race)))
}

pub async fn list_races(
    State(state): State<AppState>,
    Query(query): Query<RaceListQuery>,
) -> Result<Json<Vec<Race>>, ApiError> {
    Ok(Json(state.service.list_races(query.active_only).await?))
}

pub async fn get_race(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<Json<Race>, ApiError> {
    Ok(Json(state.service.get_race(race_id).await?))
}

pub async fn update_race(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
    body: Result<Json<RaceUpdate>, JsonRejection>,
) -> Result<Json<Race>, ApiError> {
    let race = state.service.update_race(race_id, payload(body)?).await?;
    Ok(Json(race))
}

pub async fn delete_race(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_race(race_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_race(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<Json<Race>, ApiError> {
    Ok(Json(state.service.toggle_race(race_id).await?))
}

pub async fn race_status(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<Json<RaceStatus>, ApiError> {
    Ok(Json(state.service.race_status(race_id).await?))
}

pub async fn race_questions(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<Json<Vec<PublicQuestion>>, ApiError> {
    Ok(Json(state.service.race_questions(race_id).await?))
}

// ===== Zones =====

pub async fn add_zone(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
    body: Result<Json<ZoneInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Zone>), ApiError> {
    let zone = state.service.add_zone(race_id, payload(body)?).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn update_zone(
    State(state): State<AppState>,
    Path((race_id, zone_id)): Path<(RaceId, ZoneId)>,
    body: Result<Json<ZoneInput>, JsonRejection>,
) -> Result<Json<Zone>, ApiError> {
    let zone = state
        .service
        .update_zone(race_id, zone_id, payload(body)?)
        .await?;
    Ok(Json(zone))
}

pub async fn delete_zone(
    State(state): State<AppState>,
    Path((race_id, zone_id)): Path<(RaceId, ZoneId)>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_zone(race_id, zone_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== Questions =====

pub async fn add_question(
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
    body: Result<Json<QuestionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Question>), ApiError> {
    let question = state.service.add_question(race_id, payload(body)?).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    State(state): State<AppState>,
    Path((race_id, question_id)): Path<(RaceId, QuestionId)>,
    body: Result<Json<QuestionInput>, JsonRejection>,
) -> Result<Json<Question>, ApiError> {
    let question = state
        .service
        .update_question(race_id, question_id, payload(body)?)
        .await?;
    Ok(Json(question))
}

pub async fn delete_question(
    State(state): State<AppState>,
    Path((race_id, question_id)): Path<(RaceId, QuestionId)>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_question(race_id, question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
