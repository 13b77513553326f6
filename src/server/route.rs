use super::handlers::{gameplay, health, leaderboard, lobbies, races, teams};
use super::{auth, websocket_listener, HuntService};
use crate::config::ServerConfig;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: HuntService,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(service: HuntService, config: ServerConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public_routes(&state))
        .merge(organizer_routes(&state))
        .merge(socket_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/lobbies/by-code/:code", get(lobbies::find_by_code))
        .route("/api/lobbies/:id/status", get(lobbies::hunt_status))
        .route("/api/lobbies/:id/teams", post(lobbies::create_team))
        .route("/api/lobbies/:id/join-team", post(lobbies::join_team))
        .route("/api/lobbies/:id/teams/:team_id", delete(lobbies::leave_lobby))
        .route(
            "/api/teams",
            get(teams::list_teams).post(teams::create_team),
        )
        .route("/api/teams/join", post(teams::join_team))
        .route("/api/teams/:id", get(teams::get_team))
        .route("/api/teams/:id/race", get(teams::team_race))
        .route("/api/races/:id/questions", get(races::race_questions))
        .route("/api/races/:id/status", get(races::race_status))
        .route(
            "/api/lobbies/:id/questions/:question_id",
            get(gameplay::question_view),
        )
        .route(
            "/api/lobbies/:id/questions/:question_id/answer",
            post(gameplay::check_answer),
        )
        .route(
            "/api/lobbies/:id/questions/:question_id/photo",
            post(gameplay::upload_photo)
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route(
            "/api/progress/question-index",
            post(gameplay::save_question_index),
        )
        .route("/api/leaderboard", get(leaderboard::leaderboard))
}

fn organizer_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/races", get(races::list_races).post(races::create_race))
        .route(
            "/api/races/:id",
            get(races::get_race)
                .put(races::update_race)
                .delete(races::delete_race),
        )
        .route("/api/races/:id/toggle", post(races::toggle_race))
        .route("/api/races/:id/zones", post(races::add_zone))
        .route(
            "/api/races/:id/zones/:zone_id",
            put(races::update_zone).delete(races::delete_zone),
        )
        .route("/api/races/:id/questions", post(races::add_question))
        .route(
            "/api/races/:id/questions/:question_id",
            put(races::update_question).delete(races::delete_question),
        )
        .route(
            "/api/lobbies",
            get(lobbies::list_lobbies).post(lobbies::create_lobby),
        )
        .route(
            "/api/lobbies/:id",
            get(lobbies::lobby_details).delete(lobbies::delete_lobby),
        )
        .route("/api/lobbies/:id/toggle", post(lobbies::toggle_lobby))
        .route("/api/lobbies/:id/start", post(lobbies::start_race))
        .route(
            "/api/teams/:id",
            put(teams::rename_team).delete(teams::delete_team),
        )
        .route(
            "/api/leaderboard/refresh",
            post(leaderboard::refresh_leaderboard),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_organizer,
        ))
}

fn socket_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/lobby/:id", get(websocket_listener::lobby_socket))
        .route("/ws/race/:id", get(websocket_listener::race_socket))
        .route("/ws/team/:id", get(websocket_listener::team_socket))
        .route("/ws/leaderboard", get(websocket_listener::leaderboard_socket))
        .route(
            "/ws/available-teams",
            get(websocket_listener::available_teams_socket),
        )
}

