use crate::model::{ClientId, ClientRequest, HuntError, HuntEvent, LobbyId, RaceId, TeamId, Topic};
use crate::server::{ApiError, AppState, HuntService};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, Receiver, Sender};

pub async fn lobby_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Response, ApiError> {
    open(ws, state, Topic::Lobby(lobby_id)).await
}

pub async fn race_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(race_id): Path<RaceId>,
) -> Result<Response, ApiError> {
    open(ws, state, Topic::Race(race_id)).await
}

pub async fn team_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
) -> Result<Response, ApiError> {
    open(ws, state, Topic::Team(team_id)).await
}

pub async fn leaderboard_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    open(ws, state, Topic::Leaderboard).await
}

pub async fn available_teams_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    open(ws, state, Topic::AvailableTeams).await
}

/// Refuses the upgrade with a JSON error when the topic's subject is unknown.
async fn open(ws: WebSocketUpgrade, state: AppState, topic: Topic) -> Result<Response, ApiError> {
    state.service.ensure_topic(topic).await?;
    Ok(handle_websocket(ws, state, topic).into_response())
}

pub fn handle_websocket(ws: WebSocketUpgrade, state: AppState, topic: Topic) -> impl IntoResponse {
    ws.on_upgrade(move |socket| listen(socket, state, topic))
}

/// One live connection: the hub queue on one side, the socket on the other.
struct Subscriber {
    client_id: ClientId,
    topic: Topic,
    sender: Sender<Message>,
    service: HuntService,
}

impl Subscriber {
    async fn send(&self, event: &HuntEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if let Err(e) = self.sender.send(Message::Text(payload.into())).await {
                    log::error!("Failed to queue message for {}: {:?}", self.client_id, e);
                }
            }
            Err(e) => log::error!("Failed to serialize event: {:?}", e),
        }
    }

    async fn greet(&self) {
        self.send(&HuntEvent::ConnectionEstablished {
            client_id: self.client_id,
            topic: self.topic.to_string(),
        })
        .await;
        self.send_snapshot().await;
    }

    async fn send_snapshot(&self) {
        match self.service.snapshot(self.topic).await {
            Ok(events) => {
                for event in &events {
                    self.send(event).await;
                }
            }
            Err(e) => self.send(&HuntEvent::error(e.to_string())).await,
        }
    }

    async fn handle_request(&self, request: ClientRequest) -> Result<(), HuntError> {
        match request {
            ClientRequest::Ping => self.send(&HuntEvent::Pong).await,
            ClientRequest::GetData => self.send_snapshot().await,
            ClientRequest::CheckStatus => {
                let status = self.service.status_event(self.topic).await?;
                self.send(&status).await;
            }
            ClientRequest::Join { team_code } => {
                if let Some(team_code) = team_code {
                    let team = self.service.team_by_code(&team_code).await?;
                    log::info!(
                        "Client {} joined {} as team {}",
                        self.client_id,
                        self.topic,
                        team.id
                    );
                }
                self.send_snapshot().await;
            }
        }
        Ok(())
    }
}

async fn listen(socket: WebSocket, state: AppState, topic: Topic) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.channel_capacity.max(1));
    let notifier = state.service.notifier().clone();

    let client_id = match notifier.subscribe(topic, tx.clone()).await {
        Ok(client_id) => client_id,
        Err(e) => {
            log::error!("Failed to subscribe to {}: {:?}", topic, e);
            return;
        }
    };
    let subscriber = Subscriber {
        client_id,
        topic,
        sender: tx,
        service: state.service.clone(),
    };
    log::info!("Client {} connected to {}", client_id, topic);

    let sender_task = handle_outgoing_messages(rx, ws_sender);
    let receiver_task = async {
        subscriber.greet().await;
        handle_incoming_messages(ws_receiver, &subscriber).await;
    };

    tokio::select! {
        _ = sender_task => {
            log::info!("Sender task completed for client {}", client_id);
        }
        _ = receiver_task => {
            log::info!("Receiver task completed for client {}", client_id);
        }
    }
    if let Err(e) = notifier.unsubscribe(client_id).await {
        log::error!("Failed to unsubscribe {}: {:?}", client_id, e);
    }
}

async fn handle_outgoing_messages(
    mut rx: Receiver<Message>,
    mut ws_sender: SplitSink<WebSocket, Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = ws_sender.send(msg).await {
            log::error!("Failed to send message: {:?}", e);
            break;
        }
    }
}

async fn handle_incoming_messages(mut receiver: SplitStream<WebSocket>, subscriber: &Subscriber) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => {
                log::info!("Client disconnected {}", subscriber.client_id);
                break;
            }
            Ok(message) => handle_message(message, subscriber).await,
            Err(e) => {
                log::error!("Failed to receive message: {:?}", e);
                break;
            }
        }
    }
}

async fn handle_message(message: Message, subscriber: &Subscriber) {
    match message {
        Message::Text(text) => match serde_json::from_str::<ClientRequest>(&text.to_string()) {
            Ok(request) => {
                if let Err(e) = subscriber.handle_request(request).await {
                    log::warn!("Request from {} failed: {}", subscriber.client_id, e);
                    subscriber.send(&HuntEvent::error(e.to_string())).await;
                }
            }
            Err(e) => {
                log::warn!("Failed to parse request from {}: {:?}", subscriber.client_id, e);
                subscriber
                    .send(&HuntEvent::error(format!("Unrecognised request: {}", e)))
                    .await;
            }
        },
        Message::Ping(_) | Message::Pong(_) => {}
        _ => {
            log::warn!(
                "Unsupported message type: {:?} from {}",
                message,
                subscriber.client_id
            );
        }
    }
}
