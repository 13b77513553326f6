use super::HuntService;
use crate::model::{HuntEvent, Lobby, LobbyId, NewRace, QuestionInput, Race, Team, ZoneInput};
use axum::extract::ws::Message;
use chrono::Duration;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub(crate) struct Fixture {
    pub service: HuntService,
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let service = HuntService::in_memory(dir.path().join("uploads"));
        Self { service, dir }
    }

    /// Same service on an in-memory SQLite database; connections stay in memory.
    #[cfg(feature = "sqlite")]
    pub fn sqlite() -> Self {
        use crate::server::{MemoryStorage, Notifier, SqliteStorage};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open_in_memory().unwrap();
        let notifier = Notifier::new(Arc::new(MemoryStorage::new()));
        let service = HuntService::new(storage, notifier, dir.path().join("uploads"));
        Self { service, dir }
    }

    /// One fixture per storage backend.
    pub fn each_store() -> Vec<Self> {
        let mut fixtures = vec![Self::new()];
        #[cfg(feature = "sqlite")]
        fixtures.push(Self::sqlite());
        fixtures
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// An active race with one zone and `count` questions answered by `answer{i}`.
    pub async fn race_with_questions(&self, count: usize) -> Race {
        let race = self
            .service
            .create_race(
                NewRace {
                    name: "Old Town".to_string(),
                    ..NewRace::default()
                },
                "organizer",
            )
            .await
            .unwrap();
        let zone = self
            .service
            .add_zone(
                race.id,
                ZoneInput {
                    name: "Main".to_string(),
                    location: "Market square".to_string(),
                },
            )
            .await
            .unwrap();
        for i in 0..count {
            self.service
                .add_question(
                    race.id,
                    QuestionInput {
                        zone_id: zone.id,
                        text: format!("Question {}", i),
                        answer: format!("answer{}", i),
                        points: Some(10),
                        requires_photo: false,
                    },
                )
                .await
                .unwrap();
        }
        self.service.get_race(race.id).await.unwrap()
    }

    /// A two question race already started in a lobby with team "Owls".
    pub async fn started_lobby(&self) -> (Lobby, Team, Race) {
        let race = self.race_with_questions(2).await;
        let lobby = self
            .service
            .create_lobby("Hall", Some(race.id))
            .await
            .unwrap();
        let team = self
            .service
            .create_team_in_lobby(lobby.id, "Owls", "alice")
            .await
            .unwrap();
        self.service.start_race(lobby.id, None).await.unwrap();
        let lobby = self.service.lobby(lobby.id).await.unwrap();
        (lobby, team, race)
    }

    /// Moves a started lobby's clock back by `by`.
    pub async fn rewind_start(&self, lobby_id: LobbyId, by: Duration) {
        let mut lobby = self.service.lobby(lobby_id).await.unwrap();
        lobby.start_time = lobby.start_time.map(|start| start - by);
        self.service.lobbies.save_lobby(lobby).await.unwrap();
    }
}

/// Everything queued for a subscriber so far.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<HuntEvent> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            events.push(serde_json::from_str(&text.to_string()).unwrap());
        }
    }
    events
}
