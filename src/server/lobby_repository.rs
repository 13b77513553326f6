use super::RepositoryError;
use crate::model::{Lobby, LobbyId, TeamId};
use async_trait::async_trait;

#[async_trait]
pub trait LobbyRepository: Send + Sync {
    /// Fails with a conflict when the code is taken.
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError>;
    async fn save_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError>;
    async fn get_lobby(&self, id: LobbyId) -> Result<Option<Lobby>, RepositoryError>;
    async fn get_lobby_by_code(&self, code: &str) -> Result<Option<Lobby>, RepositoryError>;
    async fn list_lobbies(&self) -> Result<Vec<Lobby>, RepositoryError>;
    async fn delete_lobby(&self, id: LobbyId) -> Result<bool, RepositoryError>;
    async fn lobbies_with_team(&self, team_id: TeamId) -> Result<Vec<Lobby>, RepositoryError>;
}
