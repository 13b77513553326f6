use crate::model::{ClientId, Topic};
use axum::extract::ws::Message;
use tokio::sync::mpsc::Sender;

/// A live subscriber: one WebSocket bound to one topic.
#[derive(Debug, Clone)]
pub struct Connection {
    pub client_id: ClientId,
    pub topic: Topic,
    pub sender: Sender<Message>,
}

impl Connection {
    pub fn new(client_id: ClientId, topic: Topic, sender: Sender<Message>) -> Self {
        Self {
            client_id,
            topic,
            sender,
        }
    }
}
