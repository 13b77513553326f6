use super::RepositoryError;
use crate::model::{Race, RaceId};
use async_trait::async_trait;

#[async_trait]
pub trait RaceRepository: Send + Sync {
    async fn insert_race(&self, race: Race) -> Result<(), RepositoryError>;

    /// Replaces the whole aggregate, zones and questions included.
    async fn save_race(&self, race: Race) -> Result<(), RepositoryError>;

    async fn get_race(&self, id: RaceId) -> Result<Option<Race>, RepositoryError>;

    /// Newest first.
    async fn list_races(&self) -> Result<Vec<Race>, RepositoryError>;

    async fn delete_race(&self, id: RaceId) -> Result<bool, RepositoryError>;
}
