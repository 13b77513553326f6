mod auth;
mod connection;
mod connection_repository;
mod error;
pub mod handlers;
mod lobby_repository;
mod memory_storage;
mod notifier;
mod progress_repository;
mod race_repository;
pub mod route;
#[cfg(feature = "sqlite")]
mod schema;
mod service;
#[cfg(feature = "sqlite")]
mod sqlite_storage;
mod team_repository;
pub mod telemetry;
pub mod websocket_listener;

pub use connection::Connection;
pub use connection_repository::ConnectionRepository;
pub use error::{ApiError, RepositoryError};
pub use lobby_repository::LobbyRepository;
pub use memory_storage::MemoryStorage;
pub use notifier::Notifier;
pub use progress_repository::ProgressRepository;
pub use race_repository::RaceRepository;
pub use route::{create_router, AppState};
pub use service::{
    HuntService, LobbyDetails, PhotoResult, QuestionView, StartedRace, TeamRace,
};
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
pub use team_repository::TeamRepository;
