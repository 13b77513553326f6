use super::payload;
use crate::model::{HuntStatus, Lobby, LobbyId, RaceId, Team, TeamId};
use crate::server::{ApiError, AppState, LobbyDetails, StartedRace};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NewLobby {
    pub name: String,
    #[serde(default)]
    pub race_id: Option<RaceId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub race_id: Option<RaceId>,
}

#[derive(Debug, Deserialize)]
pub struct NewTeam {
    pub team_name: String,
    pub player_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinTeam {
    pub team_code: String,
    pub player_name: String,
}

pub async fn create_lobby(
    State(state): State<AppState>,
    body: Result<Json<NewLobby>, JsonRejection>,
) -> Result<(StatusCode, Json<Lobby>), ApiError> {
    let NewLobby { name, race_id } = payload(body)?;
    let lobby = state.service.create_lobby(&name, race_id).await?;
    Ok((StatusCode::CREATED, Json(lobby)))
}

pub async fn list_lobbies(State(state): State<AppState>) -> Result<Json<Vec<Lobby>>, ApiError> {
    Ok(Json(state.service.list_lobbies().await?))
}

pub async fn lobby_details(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<LobbyDetails>, ApiError> {
    Ok(Json(state.service.lobby_details(lobby_id).await?))
}

pub async fn delete_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_lobby(lobby_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<Lobby>, ApiError> {
    Ok(Json(state.service.toggle_lobby(lobby_id).await?))
}

/// The body is optional; without one the lobby's own race is started.
pub async fn start_race(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartedRace>, ApiError> {
    let race_id = body.and_then(|Json(request)| request.race_id);
    Ok(Json(state.service.start_race(lobby_id, race_id).await?))
}

pub async fn find_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Lobby>, ApiError> {
    Ok(Json(state.service.find_lobby_by_code(&code).await?))
}

pub async fn hunt_status(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<HuntStatus>, ApiError> {
    Ok(Json(state.service.hunt_status(lobby_id).await?))
}

pub async fn create_team(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
    body: Result<Json<NewTeam>, JsonRejection>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    let NewTeam {
        team_name,
        player_name,
    } = payload(body)?;
    let team = state
        .service
        .create_team_in_lobby(lobby_id, &team_name, &player_name)
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn join_team(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
    body: Result<Json<JoinTeam>, JsonRejection>,
) -> Result<Json<Team>, ApiError> {
    let JoinTeam {
        team_code,
        player_name,
    } = payload(body)?;
    let team = state
        .service
        .join_team(&team_code, &player_name, Some(lobby_id))
        .await?;
    Ok(Json(team))
}

pub async fn leave_lobby(
    State(state): State<AppState>,
    Path((lobby_id, team_id)): Path<(LobbyId, TeamId)>,
) -> Result<StatusCode, ApiError> {
    state.service.leave_lobby(lobby_id, team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
