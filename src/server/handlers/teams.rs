use super::lobbies::{JoinTeam, NewTeam};
use super::payload;
use crate::model::{Team, TeamId};
use crate::server::{ApiError, AppState, TeamRace};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RenameTeam {
    pub name: String,
}

pub async fn create_team(
    State(state): State<AppState>,
    body: Result<Json<NewTeam>, JsonRejection>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    let NewTeam {
        team_name,
        player_name,
    } = payload(body)?;
    let team = state
        .service
        .create_standalone_team(&team_name, &player_name)
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn join_team(
    State(state): State<AppState>,
    body: Result<Json<JoinTeam>, JsonRejection>,
) -> Result<Json<Team>, ApiError> {
    let JoinTeam {
        team_code,
        player_name,
    } = payload(body)?;
    Ok(Json(
        state.service.join_team(&team_code, &player_name, None).await?,
    ))
}

pub async fn list_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>, ApiError> {
    Ok(Json(state.service.list_teams().await?))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
) -> Result<Json<Team>, ApiError> {
    Ok(Json(state.service.get_team(team_id).await?))
}

pub async fn team_race(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
) -> Result<Json<TeamRace>, ApiError> {
    Ok(Json(state.service.team_race(team_id).await?))
}

pub async fn rename_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    body: Result<Json<RenameTeam>, JsonRejection>,
) -> Result<Json<Team>, ApiError> {
    let RenameTeam { name } = payload(body)?;
    Ok(Json(state.service.rename_team(team_id, &name).await?))
}

pub async fn delete_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_team(team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
