#![allow(dead_code)]

use scavenger_hunt::config::ServerConfig;
use scavenger_hunt::server::{create_router, AppState, HuntService};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TOKEN: &str = "s3cret";

pub struct TestServer {
    pub base_url: String,
    pub http: reqwest::Client,
    dir: TempDir,
}

#[cfg(feature = "sqlite")]
fn sqlite_service(config: &ServerConfig, dir: &TempDir) -> HuntService {
    use scavenger_hunt::server::{MemoryStorage, Notifier, SqliteStorage};
    use std::sync::Arc;

    let storage = SqliteStorage::open(dir.path().join(&config.database)).unwrap();
    let notifier = Notifier::new(Arc::new(MemoryStorage::new()));
    HuntService::new(storage, notifier, config.upload_dir.clone())
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_service(config: &ServerConfig, _dir: &TempDir) -> HuntService {
    HuntService::in_memory(config.upload_dir.clone())
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    /// Same server on a SQLite file inside the temp dir.
    #[cfg(feature = "sqlite")]
    pub async fn start_sqlite() -> Self {
        Self::start_with(ServerConfig {
            database: "hunt.sqlite3".to_string(),
            ..ServerConfig::default()
        })
        .await
    }

    /// Relative database paths are placed inside the server's temp dir.
    pub async fn start_with(config: ServerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            organizer_token: Some(TOKEN.to_string()),
            upload_dir: dir.path().join("uploads"),
            ..config
        };
        let service = if config.uses_memory_storage() {
            HuntService::in_memory(config.upload_dir.clone())
        } else {
            sqlite_service(&config, &dir)
        };
        let app = create_router(AppState::new(service, config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            http: reqwest::Client::new(),
            dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.replacen("http://", "ws://", 1), path)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub async fn organizer_post(&self, path: &str, body: Value) -> Value {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(
            response.status().is_success(),
            "POST {} failed with {}",
            path,
            response.status()
        );
        response.json().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }

    /// An active race with one zone and `count` questions answered by `answer{i}`.
    pub async fn race_with_questions(&self, count: usize) -> Value {
        let race = self
            .organizer_post("/api/races", json!({ "name": "Old Town", "time_limit_minutes": 30 }))
            .await;
        let race_id = race["id"].as_str().unwrap().to_string();
        let zone = self
            .organizer_post(
                &format!("/api/races/{}/zones", race_id),
                json!({ "name": "Main", "location": "Market square" }),
            )
            .await;
        for i in 0..count {
            self.organizer_post(
                &format!("/api/races/{}/questions", race_id),
                json!({
                    "zone_id": zone["id"],
                    "text": format!("Question {}", i),
                    "answer": format!("answer{}", i),
                    "points": 10,
                }),
            )
            .await;
        }
        self.get(&format!("/api/races/{}/questions", race_id))
            .await
            .json::<Value>()
            .await
            .map(|questions| json!({ "id": race_id, "questions": questions }))
            .unwrap()
    }

    /// Race, lobby and team "Owls", not yet started.
    pub async fn lobby_with_team(&self, questions: usize) -> (Value, Value, Value) {
        let race = self.race_with_questions(questions).await;
        let lobby = self
            .organizer_post("/api/lobbies", json!({ "name": "Hall", "race_id": race["id"] }))
            .await;
        let team: Value = self
            .post(
                &format!("/api/lobbies/{}/teams", lobby["id"].as_str().unwrap()),
                json!({ "team_name": "Owls", "player_name": "alice" }),
            )
            .await
            .json()
            .await
            .unwrap();
        (race, lobby, team)
    }

    pub async fn start_hunt(&self, lobby: &Value) -> Value {
        self.organizer_post(
            &format!("/api/lobbies/{}/start", lobby["id"].as_str().unwrap()),
            json!({}),
        )
        .await
    }
}
