use super::{Connection, RepositoryError};
use crate::model::{ClientId, Topic};
use async_trait::async_trait;

#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn add_connection(&self, connection: Connection) -> Result<(), RepositoryError>;
    async fn remove_connection(&self, id: ClientId) -> Result<Option<Connection>, RepositoryError>;
    async fn connections_for_topic(&self, topic: Topic) -> Result<Vec<Connection>, RepositoryError>;
    async fn get_all_connections(&self) -> Result<Vec<Connection>, RepositoryError>;
}
