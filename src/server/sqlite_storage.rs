//! Durable store on SQLite.
//!
//! The synchronous connection sits behind a mutex and every repository call
//! runs on the blocking pool.

use super::schema::{
    ADD_TEAM_NAME_KEY, CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE, TEAM_NAME_KEY_INDEX,
};
use super::{LobbyRepository, ProgressRepository, RaceRepository, RepositoryError, TeamRepository};
use crate::model::{
    Lobby, LobbyId, Question, QuestionId, Race, RaceId, Team, TeamAnswer, TeamId, TeamMember,
    TeamRaceProgress, Timestamp, Zone,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::Database(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;
        info!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), RepositoryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_VERSION_TABLE)?;

        let version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        if version < CURRENT_VERSION {
            Self::migrate(conn, version)?;
        }
        Ok(())
    }

    fn migrate(conn: &Connection, from_version: i32) -> Result<(), RepositoryError> {
        if from_version < 1 {
            conn.execute_batch(SCHEMA)?;
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![1, Utc::now().to_rfc3339()],
            )?;
            info!("Database migrated to version 1");
        }
        if from_version < 2 {
            conn.execute_batch(ADD_TEAM_NAME_KEY)?;
            let names: Vec<(String, String)> = {
                let mut stmt = conn.prepare("SELECT id, name FROM teams")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            for (id, name) in names {
                conn.execute(
                    "UPDATE teams SET name_key = ?1 WHERE id = ?2",
                    params![Team::name_key(&name), id],
                )?;
            }
            conn.execute_batch(TEAM_NAME_KEY_INDEX)?;
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![2, Utc::now().to_rfc3339()],
            )?;
            info!("Database migrated to version 2");
        }
        Ok(())
    }

    async fn call<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| RepositoryError::Lock(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
    }
}

// ========== Row conversion ==========

fn parse_id(value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> Result<Timestamp, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn parse_optional_time(value: Option<String>) -> Result<Option<Timestamp>, RepositoryError> {
    value.as_deref().map(parse_time).transpose()
}

fn format_time(time: &Timestamp) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ids<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Uuid>, RepositoryError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_id(&row?)?);
    }
    Ok(ids)
}

// ========== Races ==========

fn load_race(conn: &Connection, id: RaceId) -> Result<Option<Race>, RepositoryError> {
    let row = conn
        .query_row(
            "SELECT name, description, start_location, time_limit_minutes, is_active,
             created_by, created_at FROM races WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((
        name,
        description,
        start_location,
        time_limit_minutes,
        is_active,
        created_by,
        created_at,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Race {
        id,
        name,
        description,
        start_location,
        time_limit_minutes,
        is_active,
        created_by,
        created_at: parse_time(&created_at)?,
        zones: load_zones(conn, id)?,
    }))
}

fn load_zones(conn: &Connection, race_id: RaceId) -> Result<Vec<Zone>, RepositoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, location, created_at FROM zones WHERE race_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![race_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut zones = Vec::new();
    for row in rows {
        let (id, name, location, created_at) = row?;
        let id = parse_id(&id)?;
        zones.push(Zone {
            id,
            name,
            location,
            created_at: parse_time(&created_at)?,
            questions: load_questions(conn, id)?,
        });
    }
    Ok(zones)
}

fn load_questions(conn: &Connection, zone_id: Uuid) -> Result<Vec<Question>, RepositoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, text, answer, points, requires_photo, created_at
         FROM questions WHERE zone_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![zone_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut questions = Vec::new();
    for row in rows {
        let (id, text, answer, points, requires_photo, created_at) = row?;
        questions.push(Question {
            id: parse_id(&id)?,
            text,
            answer,
            points,
            requires_photo,
            created_at: parse_time(&created_at)?,
        });
    }
    Ok(questions)
}

/// Upserts the race, its zones and questions, then drops rows no longer in the aggregate.
fn write_race(tx: &Transaction<'_>, race: &Race) -> Result<(), RepositoryError> {
    let race_id = race.id.to_string();
    tx.execute(
        "INSERT INTO races (id, name, description, start_location, time_limit_minutes,
         is_active, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name,
         description = excluded.description, start_location = excluded.start_location,
         time_limit_minutes = excluded.time_limit_minutes, is_active = excluded.is_active",
        params![
            race_id,
            race.name,
            race.description,
            race.start_location,
            race.time_limit_minutes,
            race.is_active,
            race.created_by,
            format_time(&race.created_at),
        ],
    )?;

    let mut kept_zones = HashSet::new();
    let mut kept_questions = HashSet::new();
    for (zone_position, zone) in race.zones.iter().enumerate() {
        tx.execute(
            "INSERT INTO zones (id, race_id, name, location, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name,
             location = excluded.location, position = excluded.position",
            params![
                zone.id.to_string(),
                race_id,
                zone.name,
                zone.location,
                zone_position as i64,
                format_time(&zone.created_at),
            ],
        )?;
        kept_zones.insert(zone.id);

        for (position, question) in zone.questions.iter().enumerate() {
            tx.execute(
                "INSERT INTO questions (id, zone_id, text, answer, points, requires_photo,
                 position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET zone_id = excluded.zone_id,
                 text = excluded.text, answer = excluded.answer, points = excluded.points,
                 requires_photo = excluded.requires_photo, position = excluded.position",
                params![
                    question.id.to_string(),
                    zone.id.to_string(),
                    question.text,
                    question.answer,
                    question.points,
                    question.requires_photo,
                    position as i64,
                    format_time(&question.created_at),
                ],
            )?;
            kept_questions.insert(question.id);
        }
    }

    let stored_questions = ids(
        tx,
        "SELECT q.id FROM questions q JOIN zones z ON q.zone_id = z.id WHERE z.race_id = ?1",
        params![race_id],
    )?;
    for id in stored_questions.into_iter().filter(|id| !kept_questions.contains(id)) {
        tx.execute("DELETE FROM questions WHERE id = ?1", params![id.to_string()])?;
    }

    let stored_zones = ids(tx, "SELECT id FROM zones WHERE race_id = ?1", params![race_id])?;
    for id in stored_zones.into_iter().filter(|id| !kept_zones.contains(id)) {
        tx.execute("DELETE FROM zones WHERE id = ?1", params![id.to_string()])?;
    }
    Ok(())
}

#[async_trait]
impl RaceRepository for SqliteStorage {
    #[instrument(skip(self, race), fields(race_id = %race.id))]
    async fn insert_race(&self, race: Race) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM races WHERE id = ?1)",
                params![race.id.to_string()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(RepositoryError::Conflict { field: "id" });
            }
            let tx = conn.transaction()?;
            write_race(&tx, &race)?;
            tx.commit()?;
            debug!("Race inserted");
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, race), fields(race_id = %race.id))]
    async fn save_race(&self, race: Race) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM races WHERE id = ?1)",
                params![race.id.to_string()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(RepositoryError::NotFound(race.id.to_string()));
            }
            let tx = conn.transaction()?;
            write_race(&tx, &race)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_race(&self, id: RaceId) -> Result<Option<Race>, RepositoryError> {
        self.call(move |conn| load_race(conn, id)).await
    }

    #[instrument(skip(self))]
    async fn list_races(&self) -> Result<Vec<Race>, RepositoryError> {
        self.call(|conn| {
            let race_ids = ids(
                conn,
                "SELECT id FROM races ORDER BY created_at DESC",
                [],
            )?;
            let mut races = Vec::with_capacity(race_ids.len());
            for id in race_ids {
                if let Some(race) = load_race(conn, id)? {
                    races.push(race);
                }
            }
            Ok(races)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_race(&self, id: RaceId) -> Result<bool, RepositoryError> {
        self.call(move |conn| {
            let deleted = conn.execute("DELETE FROM races WHERE id = ?1", params![id.to_string()])?;
            Ok(deleted > 0)
        })
        .await
    }
}

// ========== Lobbies ==========

fn load_lobby(conn: &Connection, id: LobbyId) -> Result<Option<Lobby>, RepositoryError> {
    let row = conn
        .query_row(
            "SELECT name, code, race_id, is_active, hunt_started, start_time, created_at,
             updated_at FROM lobbies WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((name, code, race_id, is_active, hunt_started, start_time, created_at, updated_at)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(Lobby {
        id,
        name,
        code,
        race_id: race_id.as_deref().map(parse_id).transpose()?,
        is_active,
        hunt_started,
        start_time: parse_optional_time(start_time)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
        team_ids: ids(
            conn,
            "SELECT team_id FROM lobby_teams WHERE lobby_id = ?1 ORDER BY position",
            params![id.to_string()],
        )?,
    }))
}

fn write_lobby(tx: &Transaction<'_>, lobby: &Lobby) -> Result<(), RepositoryError> {
    let lobby_id = lobby.id.to_string();
    tx.execute(
        "INSERT INTO lobbies (id, name, code, race_id, is_active, hunt_started, start_time,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, code = excluded.code,
         race_id = excluded.race_id, is_active = excluded.is_active,
         hunt_started = excluded.hunt_started, start_time = excluded.start_time,
         updated_at = excluded.updated_at",
        params![
            lobby_id,
            lobby.name,
            lobby.code,
            lobby.race_id.map(|id| id.to_string()),
            lobby.is_active,
            lobby.hunt_started,
            lobby.start_time.as_ref().map(format_time),
            format_time(&lobby.created_at),
            format_time(&lobby.updated_at),
        ],
    )?;

    tx.execute("DELETE FROM lobby_teams WHERE lobby_id = ?1", params![lobby_id])?;
    for (position, team_id) in lobby.team_ids.iter().enumerate() {
        tx.execute(
            "INSERT INTO lobby_teams (lobby_id, team_id, position) VALUES (?1, ?2, ?3)",
            params![lobby_id, team_id.to_string(), position as i64],
        )?;
    }
    Ok(())
}

fn lobby_exists(conn: &Connection, id: LobbyId) -> Result<bool, RepositoryError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM lobbies WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )?)
}

#[async_trait]
impl LobbyRepository for SqliteStorage {
    #[instrument(skip(self, lobby), fields(lobby_id = %lobby.id, code = %lobby.code))]
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            if lobby_exists(conn, lobby.id)? {
                return Err(RepositoryError::Conflict { field: "id" });
            }
            let tx = conn.transaction()?;
            write_lobby(&tx, &lobby)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, lobby), fields(lobby_id = %lobby.id))]
    async fn save_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            if !lobby_exists(conn, lobby.id)? {
                return Err(RepositoryError::NotFound(lobby.id.to_string()));
            }
            let tx = conn.transaction()?;
            write_lobby(&tx, &lobby)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_lobby(&self, id: LobbyId) -> Result<Option<Lobby>, RepositoryError> {
        self.call(move |conn| load_lobby(conn, id)).await
    }

    #[instrument(skip(self))]
    async fn get_lobby_by_code(&self, code: &str) -> Result<Option<Lobby>, RepositoryError> {
        let code = code.to_string();
        self.call(move |conn| {
            match ids(conn, "SELECT id FROM lobbies WHERE code = ?1", params![code])?.first() {
                Some(id) => load_lobby(conn, *id),
                None => Ok(None),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_lobbies(&self) -> Result<Vec<Lobby>, RepositoryError> {
        self.call(|conn| {
            let lobby_ids = ids(
                conn,
                "SELECT id FROM lobbies ORDER BY created_at DESC",
                [],
            )?;
            let mut lobbies = Vec::with_capacity(lobby_ids.len());
            for id in lobby_ids {
                lobbies.extend(load_lobby(conn, id)?);
            }
            Ok(lobbies)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_lobby(&self, id: LobbyId) -> Result<bool, RepositoryError> {
        self.call(move |conn| {
            let deleted =
                conn.execute("DELETE FROM lobbies WHERE id = ?1", params![id.to_string()])?;
            Ok(deleted > 0)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn lobbies_with_team(&self, team_id: TeamId) -> Result<Vec<Lobby>, RepositoryError> {
        self.call(move |conn| {
            let lobby_ids = ids(
                conn,
                "SELECT l.id FROM lobbies l JOIN lobby_teams lt ON lt.lobby_id = l.id
                 WHERE lt.team_id = ?1 ORDER BY l.created_at DESC",
                params![team_id.to_string()],
            )?;
            let mut lobbies = Vec::with_capacity(lobby_ids.len());
            for id in lobby_ids {
                lobbies.extend(load_lobby(conn, id)?);
            }
            Ok(lobbies)
        })
        .await
    }
}

// ========== Teams ==========

fn load_team(conn: &Connection, id: TeamId) -> Result<Option<Team>, RepositoryError> {
    let row = conn
        .query_row(
            "SELECT name, code, created_at FROM teams WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((name, code, created_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, name, joined_at FROM team_members WHERE team_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut members = Vec::new();
    for row in rows {
        let (member_id, member_name, joined_at) = row?;
        members.push(TeamMember {
            id: parse_id(&member_id)?,
            name: member_name,
            joined_at: parse_time(&joined_at)?,
        });
    }

    Ok(Some(Team {
        id,
        name,
        code,
        created_at: parse_time(&created_at)?,
        members,
    }))
}

fn write_team(tx: &Transaction<'_>, team: &Team) -> Result<(), RepositoryError> {
    let team_id = team.id.to_string();
    tx.execute(
        "INSERT INTO teams (id, name, name_key, code, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name, name_key = excluded.name_key, code = excluded.code",
        params![
            team_id,
            team.name,
            Team::name_key(&team.name),
            team.code,
            format_time(&team.created_at)
        ],
    )?;
    tx.execute("DELETE FROM team_members WHERE team_id = ?1", params![team_id])?;
    for member in &team.members {
        tx.execute(
            "INSERT INTO team_members (id, team_id, name, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                member.id.to_string(),
                team_id,
                member.name,
                format_time(&member.joined_at)
            ],
        )?;
    }
    Ok(())
}

fn team_exists(conn: &Connection, id: TeamId) -> Result<bool, RepositoryError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM teams WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )?)
}

#[async_trait]
impl TeamRepository for SqliteStorage {
    #[instrument(skip(self, team), fields(team_id = %team.id, code = %team.code))]
    async fn insert_team(&self, team: Team) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            if team_exists(conn, team.id)? {
                return Err(RepositoryError::Conflict { field: "id" });
            }
            let tx = conn.transaction()?;
            write_team(&tx, &team)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, team), fields(team_id = %team.id))]
    async fn save_team(&self, team: Team) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            if !team_exists(conn, team.id)? {
                return Err(RepositoryError::NotFound(team.id.to_string()));
            }
            let tx = conn.transaction()?;
            write_team(&tx, &team)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_team(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        self.call(move |conn| load_team(conn, id)).await
    }

    #[instrument(skip(self))]
    async fn get_team_by_code(&self, code: &str) -> Result<Option<Team>, RepositoryError> {
        let code = code.to_string();
        self.call(move |conn| {
            match ids(conn, "SELECT id FROM teams WHERE code = ?1", params![code])?.first() {
                Some(id) => load_team(conn, *id),
                None => Ok(None),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        let key = Team::name_key(name);
        self.call(move |conn| {
            let found = ids(conn, "SELECT id FROM teams WHERE name_key = ?1", params![key])?;
            match found.first() {
                Some(id) => load_team(conn, *id),
                None => Ok(None),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_teams(&self) -> Result<Vec<Team>, RepositoryError> {
        self.call(|conn| {
            let team_ids = ids(conn, "SELECT id FROM teams ORDER BY name_key", [])?;
            let mut teams = Vec::with_capacity(team_ids.len());
            for id in team_ids {
                teams.extend(load_team(conn, id)?);
            }
            Ok(teams)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_team(&self, id: TeamId) -> Result<bool, RepositoryError> {
        self.call(move |conn| {
            let deleted = conn.execute("DELETE FROM teams WHERE id = ?1", params![id.to_string()])?;
            Ok(deleted > 0)
        })
        .await
    }
}

// ========== Progress ==========

const PROGRESS_COLUMNS: &str = "team_id, race_id, score, current_question_index,
    questions_answered, photo_questions_json, last_update";

type ProgressRow = (String, String, u32, i64, u32, String, String);

fn progress_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_progress(row: ProgressRow) -> Result<TeamRaceProgress, RepositoryError> {
    let (team_id, race_id, score, index, answered, photos, last_update) = row;
    Ok(TeamRaceProgress {
        team_id: parse_id(&team_id)?,
        race_id: parse_id(&race_id)?,
        score,
        current_question_index: usize::try_from(index).unwrap_or_default(),
        questions_answered: answered,
        photo_questions_completed: serde_json::from_str(&photos)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
        last_update: parse_time(&last_update)?,
    })
}

fn query_progress(
    conn: &Connection,
    filter: &str,
    key: &[&dyn rusqlite::ToSql],
) -> Result<Vec<TeamRaceProgress>, RepositoryError> {
    let sql = format!("SELECT {} FROM team_race_progress {}", PROGRESS_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(key, progress_row)?;
    let mut progress = Vec::new();
    for row in rows {
        progress.push(into_progress(row?)?);
    }
    Ok(progress)
}

#[async_trait]
impl ProgressRepository for SqliteStorage {
    #[instrument(skip(self))]
    async fn get_progress(
        &self,
        team_id: TeamId,
        race_id: RaceId,
    ) -> Result<Option<TeamRaceProgress>, RepositoryError> {
        self.call(move |conn| {
            let mut rows = query_progress(
                conn,
                "WHERE team_id = ?1 AND race_id = ?2",
                params![team_id.to_string(), race_id.to_string()],
            )?;
            Ok(rows.pop())
        })
        .await
    }

    #[instrument(
        skip(self, progress),
        fields(team_id = %progress.team_id, race_id = %progress.race_id)
    )]
    async fn save_progress(&self, progress: TeamRaceProgress) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            let photos = serde_json::to_string(&progress.photo_questions_completed)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            conn.execute(
                "INSERT INTO team_race_progress (team_id, race_id, score, current_question_index,
                 questions_answered, photo_questions_json, last_update)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(team_id, race_id) DO UPDATE SET score = excluded.score,
                 current_question_index = excluded.current_question_index,
                 questions_answered = excluded.questions_answered,
                 photo_questions_json = excluded.photo_questions_json,
                 last_update = excluded.last_update",
                params![
                    progress.team_id.to_string(),
                    progress.race_id.to_string(),
                    progress.score,
                    progress.current_question_index as i64,
                    progress.questions_answered,
                    photos,
                    format_time(&progress.last_update),
                ],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn progress_for_race(
        &self,
        race_id: RaceId,
    ) -> Result<Vec<TeamRaceProgress>, RepositoryError> {
        self.call(move |conn| {
            query_progress(conn, "WHERE race_id = ?1", params![race_id.to_string()])
        })
        .await
    }

    #[instrument(skip(self))]
    async fn all_progress(&self) -> Result<Vec<TeamRaceProgress>, RepositoryError> {
        self.call(|conn| query_progress(conn, "", params![])).await
    }

    #[instrument(skip(self))]
    async fn get_answer(
        &self,
        team_id: TeamId,
        question_id: QuestionId,
    ) -> Result<Option<TeamAnswer>, RepositoryError> {
        self.call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT attempts, answered_correctly, points_awarded, photo_uploaded
                     FROM team_answers WHERE team_id = ?1 AND question_id = ?2",
                    params![team_id.to_string(), question_id.to_string()],
                    |row| {
                        Ok(TeamAnswer {
                            team_id,
                            question_id,
                            attempts: row.get(0)?,
                            answered_correctly: row.get(1)?,
                            points_awarded: row.get(2)?,
                            photo_uploaded: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    #[instrument(
        skip(self, answer),
        fields(team_id = %answer.team_id, question_id = %answer.question_id)
    )]
    async fn save_answer(&self, answer: TeamAnswer) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO team_answers (team_id, question_id, attempts, answered_correctly,
                 points_awarded, photo_uploaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(team_id, question_id) DO UPDATE SET attempts = excluded.attempts,
                 answered_correctly = excluded.answered_correctly,
                 points_awarded = excluded.points_awarded,
                 photo_uploaded = excluded.photo_uploaded",
                params![
                    answer.team_id.to_string(),
                    answer.question_id.to_string(),
                    answer.attempts,
                    answer.answered_correctly,
                    answer.points_awarded,
                    answer.photo_uploaded,
                ],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_team_records(&self, team_id: TeamId) -> Result<(), RepositoryError> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM team_race_progress WHERE team_id = ?1",
                params![team_id.to_string()],
            )?;
            tx.execute(
                "DELETE FROM team_answers WHERE team_id = ?1",
                params![team_id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, question_ids))]
    async fn delete_race_records(
        &self,
        race_id: RaceId,
        question_ids: &[QuestionId],
    ) -> Result<(), RepositoryError> {
        let question_ids = question_ids.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM team_race_progress WHERE race_id = ?1",
                params![race_id.to_string()],
            )?;
            for question_id in question_ids {
                tx.execute(
                    "DELETE FROM team_answers WHERE question_id = ?1",
                    params![question_id.to_string()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewRace, QuestionInput, ZoneInput};

    fn race_with_two_zones() -> Race {
        let mut race = Race::new(
            NewRace {
                name: "Harbour Run".to_string(),
                time_limit_minutes: Some(45),
                ..Default::default()
            },
            "leader",
        )
        .unwrap();
        for zone in ["Docks", "Market"] {
            let zone_id = race
                .add_zone(ZoneInput {
                    name: zone.to_string(),
                    location: String::new(),
                })
                .unwrap()
                .id;
            for text in ["first", "second"] {
                race.add_question(QuestionInput {
                    zone_id,
                    text: format!("{} {}", zone, text),
                    answer: "anchor|rope".to_string(),
                    points: Some(20),
                    requires_photo: false,
                })
                .unwrap();
            }
        }
        race
    }

    #[tokio::test]
    async fn race_aggregate_round_trips_in_order() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let race = race_with_two_zones();

        storage.insert_race(race.clone()).await.unwrap();
        let loaded = storage.get_race(race.id).await.unwrap().unwrap();

        assert_eq!(loaded.name, race.name);
        assert_eq!(loaded.time_limit_minutes, 45);
        let texts: Vec<&str> = loaded
            .ordered_questions()
            .map(|(_, q)| q.text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec!["Docks first", "Docks second", "Market first", "Market second"]
        );
    }

    #[tokio::test]
    async fn saving_race_drops_removed_zones_and_keeps_moves() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut race = race_with_two_zones();
        storage.insert_race(race.clone()).await.unwrap();

        let docks = race.zones[0].id;
        let market = race.zones[1].id;
        let moved = race.zones[1].questions[0].id;
        race.update_question(
            moved,
            QuestionInput {
                zone_id: docks,
                text: "moved".to_string(),
                answer: "x".to_string(),
                points: None,
                requires_photo: false,
            },
        )
        .unwrap();
        race.remove_zone(market).unwrap();
        storage.save_race(race.clone()).await.unwrap();

        let loaded = storage.get_race(race.id).await.unwrap().unwrap();
        assert_eq!(loaded.zones.len(), 1);
        assert_eq!(loaded.total_questions(), 3);
        assert_eq!(loaded.question_position(moved), Some(2));
    }

    #[tokio::test]
    async fn duplicate_team_name_is_a_conflict() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .insert_team(Team::new("Owls", "AAAAAA".to_string()).unwrap())
            .await
            .unwrap();

        let result = storage
            .insert_team(Team::new("OWLS", "BBBBBB".to_string()).unwrap())
            .await;

        assert_eq!(result, Err(RepositoryError::Conflict { field: "name" }));
    }

    #[tokio::test]
    async fn team_names_fold_beyond_ascii() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let team = Team::new("Équipe", "AAAAAA".to_string()).unwrap();
        storage.insert_team(team.clone()).await.unwrap();

        let result = storage
            .insert_team(Team::new("équipe", "BBBBBB".to_string()).unwrap())
            .await;

        assert_eq!(result, Err(RepositoryError::Conflict { field: "name" }));
        let found = storage.get_team_by_name(" ÉQUIPE ").await.unwrap().unwrap();
        assert_eq!(found.id, team.id);
    }

    #[tokio::test]
    async fn lobby_with_teams_round_trips() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut team = Team::new("Owls", "AAAAAA".to_string()).unwrap();
        team.add_member("alice").unwrap();
        storage.insert_team(team.clone()).await.unwrap();
        let mut lobby = Lobby::new("Hall", "LOBBY1".to_string(), None).unwrap();
        lobby.add_team(team.id);
        storage.insert_lobby(lobby.clone()).await.unwrap();

        let by_code = storage.get_lobby_by_code("LOBBY1").await.unwrap().unwrap();
        assert_eq!(by_code.team_ids, vec![team.id]);

        let with_team = storage.lobbies_with_team(team.id).await.unwrap();
        assert_eq!(with_team.len(), 1);

        let loaded_team = storage.get_team_by_code("AAAAAA").await.unwrap().unwrap();
        assert_eq!(loaded_team.member_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn deleting_a_team_cascades_to_progress() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let race = race_with_two_zones();
        storage.insert_race(race.clone()).await.unwrap();
        let team = Team::new("Owls", "AAAAAA".to_string()).unwrap();
        storage.insert_team(team.clone()).await.unwrap();

        let mut progress = TeamRaceProgress::new(team.id, race.id);
        progress.record_correct(race.zones[0].questions[0].id, 20, 0);
        progress.record_photo(race.zones[0].questions[1].id, 1, false);
        storage.save_progress(progress.clone()).await.unwrap();

        let loaded = storage.get_progress(team.id, race.id).await.unwrap().unwrap();
        assert_eq!(loaded.score, 20);
        assert_eq!(loaded.photo_questions_completed.len(), 1);

        storage.delete_team(team.id).await.unwrap();
        assert!(storage.progress_for_race(race.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopening_a_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hunt.sqlite3");
        let race = race_with_two_zones();
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.insert_race(race.clone()).await.unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        let races = storage.list_races().await.unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].total_questions(), 4);
    }

    #[tokio::test]
    async fn version_one_databases_gain_the_name_key() {
        use crate::server::schema::{SCHEMA, SCHEMA_VERSION_TABLE};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hunt.sqlite3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA_VERSION_TABLE).unwrap();
            conn.execute_batch(SCHEMA).unwrap();
            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (1, ?1)",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO teams (id, name, code, created_at)
                 VALUES (?1, 'Équipe', 'AAAAAA', ?2)",
                params![Uuid::new_v4().to_string(), format_time(&Utc::now())],
            )
            .unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert!(storage.get_team_by_name("équipe").await.unwrap().is_some());
        let result = storage
            .insert_team(Team::new("ÉQUIPE", "BBBBBB".to_string()).unwrap())
            .await;
        assert_eq!(result, Err(RepositoryError::Conflict { field: "name" }));
    }
}
