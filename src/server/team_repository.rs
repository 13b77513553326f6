use super::RepositoryError;
use crate::model::{Team, TeamId};
use async_trait::async_trait;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Fails with a conflict when the code or the name (ignoring case) is taken.
    async fn insert_team(&self, team: Team) -> Result<(), RepositoryError>;
    async fn save_team(&self, team: Team) -> Result<(), RepositoryError>;
    async fn get_team(&self, id: TeamId) -> Result<Option<Team>, RepositoryError>;
    async fn get_team_by_code(&self, code: &str) -> Result<Option<Team>, RepositoryError>;
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError>;
    async fn list_teams(&self) -> Result<Vec<Team>, RepositoryError>;
    async fn delete_team(&self, id: TeamId) -> Result<bool, RepositoryError>;
}
