use super::{Connection, ConnectionRepository, RepositoryError};
use crate::model::{ClientId, HuntEvent, Topic};
use axum::extract::ws::Message;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// In-process pub/sub hub fanning events out to live connections by topic.
#[derive(Clone)]
pub struct Notifier {
    connection_repo: Arc<dyn ConnectionRepository + Send + Sync>,
}

impl Notifier {
    pub fn new(connection_repo: Arc<dyn ConnectionRepository + Send + Sync>) -> Self {
        Self { connection_repo }
    }

    #[instrument(skip(self, sender))]
    pub async fn subscribe(
        &self,
        topic: Topic,
        sender: Sender<Message>,
    ) -> Result<ClientId, RepositoryError> {
        let client_id = Uuid::new_v4();
        self.connection_repo
            .add_connection(Connection::new(client_id, topic, sender))
            .await?;
        debug!(?client_id, %topic, "Subscribed");
        Ok(client_id)
    }

    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, client_id: ClientId) -> Result<(), RepositoryError> {
        if let Some(connection) = self.connection_repo.remove_connection(client_id).await? {
            debug!(?client_id, topic = %connection.topic, "Unsubscribed");
        }
        Ok(())
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        match self.connection_repo.connections_for_topic(topic).await {
            Ok(connections) => connections.len(),
            Err(e) => {
                error!(?e, "Failed to count subscribers");
                0
            }
        }
    }

    /// Open connections across all topics.
    pub async fn connection_count(&self) -> usize {
        match self.connection_repo.get_all_connections().await {
            Ok(connections) => connections.len(),
            Err(e) => {
                error!(?e, "Failed to count connections");
                0
            }
        }
    }

    /// Delivers to every subscriber of `topic` without waiting on any of them.
    /// A full queue drops the event for that subscriber; a closed one is unsubscribed.
    /// Returns the number of subscribers the event was queued for.
    #[instrument(skip(self, event))]
    pub async fn publish(&self, topic: Topic, event: &HuntEvent) -> usize {
        let connections = match self.connection_repo.connections_for_topic(topic).await {
            Ok(connections) => connections,
            Err(e) => {
                error!(?e, "Failed to look up subscribers");
                return 0;
            }
        };
        if connections.is_empty() {
            return 0;
        }

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(?e, "Failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in connections {
            match connection.sender.try_send(Message::Text(payload.clone().into())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        client_id = ?connection.client_id,
                        "Subscriber queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = ?connection.client_id, "Subscriber gone");
                    if let Err(e) = self.unsubscribe(connection.client_id).await {
                        error!(?e, "Failed to drop closed subscriber");
                    }
                }
            }
        }
        debug!(delivered, "Event published");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MemoryStorage;
    use tokio::sync::mpsc;

    fn notifier() -> Notifier {
        Notifier::new(Arc::new(MemoryStorage::new()))
    }

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn publishes_only_to_the_topic() {
        let notifier = notifier();
        let lobby = Uuid::new_v4();
        let (lobby_tx, mut lobby_rx) = mpsc::channel(4);
        let (board_tx, mut board_rx) = mpsc::channel(4);
        notifier.subscribe(Topic::Lobby(lobby), lobby_tx).await.unwrap();
        notifier.subscribe(Topic::Leaderboard, board_tx).await.unwrap();

        let delivered = notifier.publish(Topic::Lobby(lobby), &HuntEvent::Pong).await;

        assert_eq!(delivered, 1);
        assert!(text(lobby_rx.recv().await.unwrap()).contains("\"pong\""));
        assert!(board_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let notifier = notifier();
        let (tx, mut rx) = mpsc::channel(1);
        notifier.subscribe(Topic::Leaderboard, tx).await.unwrap();

        assert_eq!(notifier.publish(Topic::Leaderboard, &HuntEvent::Pong).await, 1);
        assert_eq!(notifier.publish(Topic::Leaderboard, &HuntEvent::Pong).await, 0);

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(notifier.subscriber_count(Topic::Leaderboard).await, 1);
    }

    #[tokio::test]
    async fn closed_subscribers_are_removed() {
        let notifier = notifier();
        let (tx, rx) = mpsc::channel(1);
        notifier.subscribe(Topic::AvailableTeams, tx).await.unwrap();
        drop(rx);

        notifier.publish(Topic::AvailableTeams, &HuntEvent::Pong).await;

        assert_eq!(notifier.subscriber_count(Topic::AvailableTeams).await, 0);
    }
}
