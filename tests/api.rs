#![cfg(all(feature = "server", feature = "client"))]

mod common;

use common::{TestServer, TOKEN};
use reqwest::StatusCode;
use scavenger_hunt::config::ServerConfig;
use serde_json::{json, Value};

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start().await;

    let body: Value = server.get("/health").await.json().await.unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn organizer_routes_require_the_token() {
    let server = TestServer::start().await;

    let anonymous = server.post("/api/races", json!({ "name": "Old Town" })).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let body: Value = anonymous.json().await.unwrap();
    assert_eq!(body["success"], false);

    let wrong = server
        .http
        .post(server.url("/api/races"))
        .bearer_auth("guess")
        .json(&json!({ "name": "Old Town" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let created = server
        .http
        .post(server.url("/api/races"))
        .bearer_auth(TOKEN)
        .json(&json!({ "name": "Old Town" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    // Public reads on shared paths stay open.
    assert_eq!(server.get("/api/teams").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn players_join_start_and_score() {
    play_a_hunt(&TestServer::start().await).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn players_join_start_and_score_on_sqlite() {
    play_a_hunt(&TestServer::start_sqlite().await).await;
}

async fn play_a_hunt(server: &TestServer) {
    let (race, lobby, team) = server.lobby_with_team(2).await;
    let lobby_id = lobby["id"].as_str().unwrap();
    let code = lobby["code"].as_str().unwrap().to_lowercase();

    let found: Value = server
        .get(&format!("/api/lobbies/by-code/{}", code))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(found["id"], lobby["id"]);

    let joined = server
        .post(
            &format!("/api/lobbies/{}/join-team", lobby_id),
            json!({ "team_code": team["code"], "player_name": "bob" }),
        )
        .await;
    assert_eq!(joined.status(), StatusCode::OK);

    let started = server.start_hunt(&lobby).await;
    let first = &race["questions"][0];
    assert_eq!(started["first_question_id"], first["id"]);
    assert_eq!(
        started["redirect_url"],
        format!(
            "/api/lobbies/{}/questions/{}",
            lobby_id,
            first["id"].as_str().unwrap()
        )
    );

    let status: Value = server
        .get(&format!("/api/lobbies/{}/status", lobby_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["hunt_started"], true);

    let question_path = format!(
        "/api/lobbies/{}/questions/{}",
        lobby_id,
        first["id"].as_str().unwrap()
    );
    let view: Value = server.get(&question_path).await.json().await.unwrap();
    assert_eq!(view["question"]["text"], "Question 0");
    assert!(view["question"].get("answer").is_none());

    let answer_path = format!("{}/answer", question_path);
    let wrong: Value = server
        .post(&answer_path, json!({ "team_code": team["code"], "answer": "nope" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(wrong["correct"], false);

    let right: Value = server
        .post(&answer_path, json!({ "team_code": team["code"], "answer": "Answer0" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(right["correct"], true);
    assert_eq!(right["attempts"], 2);
    assert_eq!(right["points"], 7);
    assert_eq!(right["next_question_id"], race["questions"][1]["id"]);

    let board: Value = server
        .get(&format!(
            "/api/leaderboard?race_id={}",
            race["id"].as_str().unwrap()
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(board[0]["name"], "Owls");
    assert_eq!(board[0]["points"], 7);
    assert_eq!(board[0]["progress_percent"], 50);
}

#[tokio::test]
async fn failures_use_the_error_envelope() {
    let server = TestServer::start().await;
    let (race, lobby, team) = server.lobby_with_team(1).await;
    let lobby_id = lobby["id"].as_str().unwrap();

    let missing = server
        .get("/api/lobbies/00000000-0000-0000-0000-000000000000/status")
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let malformed = server
        .http
        .post(server.url("/api/teams"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let early = server
        .post(
            &format!(
                "/api/lobbies/{}/questions/{}/answer",
                lobby_id,
                race["questions"][0]["id"].as_str().unwrap()
            ),
            json!({ "team_code": team["code"], "answer": "answer0" }),
        )
        .await;
    assert_eq!(early.status(), StatusCode::CONFLICT);

    let taken = server
        .post(
            "/api/teams",
            json!({ "team_name": "OWLS", "player_name": "carol" }),
        )
        .await;
    assert_eq!(taken.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn teams_outside_the_lobby_are_forbidden() {
    let server = TestServer::start().await;
    let (race, lobby, _team) = server.lobby_with_team(1).await;
    server.start_hunt(&lobby).await;
    let outsider: Value = server
        .post(
            "/api/teams",
            json!({ "team_name": "Hawks", "player_name": "dave" }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = server
        .post(
            &format!(
                "/api/lobbies/{}/questions/{}/answer",
                lobby["id"].as_str().unwrap(),
                race["questions"][0]["id"].as_str().unwrap()
            ),
            json!({ "team_code": outsider["code"], "answer": "answer0" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn raw_photo_uploads_are_stored() {
    let server = TestServer::start().await;
    let (race, lobby, team) = server.lobby_with_team(1).await;
    server.start_hunt(&lobby).await;
    let question_id = race["questions"][0]["id"].as_str().unwrap();
    let lobby_id = lobby["id"].as_str().unwrap();

    let response = server
        .http
        .post(server.url(&format!(
            "/api/lobbies/{}/questions/{}/photo?team_code={}",
            lobby_id,
            question_id,
            team["code"].as_str().unwrap()
        )))
        .header("content-type", "image/jpeg")
        .body(vec![0xFF, 0xD8, 0xFF, 0xE0])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pending_review"], true);
    assert_eq!(body["race_complete"], true);
    let stored = server
        .upload_dir()
        .join(lobby_id)
        .join(team["id"].as_str().unwrap())
        .join(format!("{}.jpg", question_id));
    assert_eq!(std::fs::read(stored).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
}

#[tokio::test]
async fn multipart_photo_uploads_are_stored() {
    let server = TestServer::start().await;
    let (race, lobby, team) = server.lobby_with_team(1).await;
    server.start_hunt(&lobby).await;

    let form = reqwest::multipart::Form::new()
        .text("team_code", team["code"].as_str().unwrap().to_string())
        .part(
            "photo",
            reqwest::multipart::Part::bytes(b"\x89PNG\r\n".to_vec())
                .file_name("clue.png")
                .mime_str("image/png")
                .unwrap(),
        );
    let response = server
        .http
        .post(server.url(&format!(
            "/api/lobbies/{}/questions/{}/photo",
            lobby["id"].as_str().unwrap(),
            race["questions"][0]["id"].as_str().unwrap()
        )))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn oversized_photos_are_rejected() {
    let server = TestServer::start_with(ServerConfig {
        max_upload_bytes: 16,
        ..ServerConfig::default()
    })
    .await;
    let (race, lobby, team) = server.lobby_with_team(1).await;
    server.start_hunt(&lobby).await;

    let response = server
        .http
        .post(server.url(&format!(
            "/api/lobbies/{}/questions/{}/photo?team_code={}",
            lobby["id"].as_str().unwrap(),
            race["questions"][0]["id"].as_str().unwrap(),
            team["code"].as_str().unwrap()
        )))
        .header("content-type", "image/png")
        .body(vec![0u8; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn started_lobbies_keep_their_teams() {
    let server = TestServer::start().await;
    let (_race, lobby, team) = server.lobby_with_team(1).await;
    server.start_hunt(&lobby).await;

    let response = server
        .http
        .delete(server.url(&format!(
            "/api/lobbies/{}/teams/{}",
            lobby["id"].as_str().unwrap(),
            team["id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
