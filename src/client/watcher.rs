use super::ReconnectPolicy;
use crate::model::{ClientRequest, HuntEvent, LeaderboardEntry, RaceId};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 32;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Connected,
    Disconnected,
    /// The socket could not be restored; standings now come from HTTP polls.
    Polling,
    Update(Vec<LeaderboardEntry>),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event receiver dropped")]
    Closed,
}

/// Follows the global or a race leaderboard and reports every change.
#[derive(Debug, Clone)]
pub struct LeaderboardWatcher {
    base_url: String,
    race_id: Option<RaceId>,
    policy: ReconnectPolicy,
    poll_interval: Duration,
    reconnect_every: u32,
    http: reqwest::Client,
}

impl LeaderboardWatcher {
    /// `base_url` is the server's HTTP root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, WatchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(WatchError::InvalidUrl(base_url));
        }
        Ok(Self {
            base_url,
            race_id: None,
            policy: ReconnectPolicy::default(),
            poll_interval: Duration::from_secs(10),
            reconnect_every: 3,
            http: reqwest::Client::new(),
        })
    }

    pub fn for_race(mut self, race_id: RaceId) -> Self {
        self.race_id = Some(race_id);
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clamped to at least one millisecond.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Number of polls between socket reconnection attempts while polling.
    pub fn with_reconnect_every(mut self, polls: u32) -> Self {
        self.reconnect_every = polls.max(1);
        self
    }

    pub fn socket_url(&self) -> String {
        let ws_base = match self.base_url.strip_prefix("https://") {
            Some(rest) => format!("wss://{}", rest),
            None => format!(
                "ws://{}",
                self.base_url.trim_start_matches("http://")
            ),
        };
        match self.race_id {
            Some(race_id) => format!("{}/ws/race/{}", ws_base, race_id),
            None => format!("{}/ws/leaderboard", ws_base),
        }
    }

    pub fn leaderboard_url(&self) -> String {
        match self.race_id {
            Some(race_id) => format!("{}/api/leaderboard?race_id={}", self.base_url, race_id),
            None => format!("{}/api/leaderboard", self.base_url),
        }
    }

    /// Runs the watcher on its own task.
    pub fn spawn(self) -> (mpsc::Receiver<WatchEvent>, JoinHandle<Result<(), WatchError>>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move { self.run(tx).await });
        (rx, handle)
    }

    /// Watches until the receiving side goes away.
    pub async fn run(&self, tx: mpsc::Sender<WatchEvent>) -> Result<(), WatchError> {
        let mut attempt = 0;
        loop {
            match self.connect().await {
                Ok(socket) => {
                    attempt = 0;
                    self.watch(socket, &tx).await?;
                }
                Err(e) => warn!(attempt, "Leaderboard socket unavailable: {}", e),
            }

            match self.policy.delay_for(attempt) {
                Some(delay) => {
                    attempt += 1;
                    debug!(?delay, attempt, "Reconnecting");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let socket = self.poll_until_reconnected(&tx).await?;
                    attempt = 0;
                    self.watch(socket, &tx).await?;
                }
            }
        }
    }

    async fn connect(&self) -> Result<Socket, WatchError> {
        let (socket, _) = connect_async(self.socket_url()).await?;
        Ok(socket)
    }

    /// Forwards leaderboard updates until the socket closes.
    async fn watch(&self, socket: Socket, tx: &mpsc::Sender<WatchEvent>) -> Result<(), WatchError> {
        let (mut sink, mut stream) = socket.split();
        info!(url = %self.socket_url(), "Leaderboard socket connected");
        emit(tx, WatchEvent::Connected).await?;

        let request = serde_json::to_string(&ClientRequest::GetData)?;
        if let Err(e) = sink.send(Message::Text(request.into())).await {
            warn!("Failed to request leaderboard: {}", e);
        }

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(entries) = self.entries_from(text.as_str()) {
                        emit(tx, WatchEvent::Update(entries)).await?;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Leaderboard socket error: {}", e);
                    break;
                }
            }
        }

        info!("Leaderboard socket disconnected");
        emit(tx, WatchEvent::Disconnected).await
    }

    fn entries_from(&self, text: &str) -> Option<Vec<LeaderboardEntry>> {
        match serde_json::from_str::<HuntEvent>(text) {
            Ok(HuntEvent::LeaderboardUpdate { race_id, entries }) if race_id == self.race_id => {
                Some(entries)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring unparseable message: {}", e);
                None
            }
        }
    }

    async fn poll_until_reconnected(
        &self,
        tx: &mpsc::Sender<WatchEvent>,
    ) -> Result<Socket, WatchError> {
        info!(interval = ?self.poll_interval, "Falling back to polling");
        emit(tx, WatchEvent::Polling).await?;

        let mut polls: u32 = 0;
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if tx.is_closed() {
                return Err(WatchError::Closed);
            }
            match self.fetch().await {
                Ok(entries) => emit(tx, WatchEvent::Update(entries)).await?,
                Err(e) => warn!("Leaderboard poll failed: {}", e),
            }

            polls = polls.wrapping_add(1);
            if polls % self.reconnect_every == 0 {
                match self.connect().await {
                    Ok(socket) => return Ok(socket),
                    Err(e) => debug!("Socket still unavailable: {}", e),
                }
            }
        }
    }

    /// One HTTP read of the current standings.
    pub async fn fetch(&self) -> Result<Vec<LeaderboardEntry>, WatchError> {
        let entries = self
            .http
            .get(self.leaderboard_url())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries)
    }
}

async fn emit(tx: &mpsc::Sender<WatchEvent>, event: WatchEvent) -> Result<(), WatchError> {
    tx.send(event).await.map_err(|_| WatchError::Closed)
}
