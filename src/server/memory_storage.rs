use super::{
    Connection, ConnectionRepository, LobbyRepository, ProgressRepository, RaceRepository,
    RepositoryError, TeamRepository,
};
use crate::model::{
    ClientId, Lobby, LobbyId, QuestionId, Race, RaceId, Team, TeamAnswer, TeamId,
    TeamRaceProgress, Timestamp, Topic,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, instrument};

/// Volatile store backing every repository with in-process maps.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    races: Arc<RwLock<HashMap<RaceId, Race>>>,
    lobbies: Arc<RwLock<HashMap<LobbyId, Lobby>>>,
    teams: Arc<RwLock<HashMap<TeamId, Team>>>,
    progress: Arc<RwLock<HashMap<(TeamId, RaceId), TeamRaceProgress>>>,
    answers: Arc<RwLock<HashMap<(TeamId, QuestionId), TeamAnswer>>>,
    connections: Arc<RwLock<HashMap<ClientId, Connection>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl Display) -> RepositoryError {
    error!(%e, "Storage lock poisoned");
    RepositoryError::Lock(e.to_string())
}

fn newest_first<T>(mut items: Vec<T>, created: impl Fn(&T) -> Timestamp) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created(item)));
    items
}

#[async_trait]
impl RaceRepository for MemoryStorage {
    #[instrument(skip(self, race), fields(race_id = %race.id))]
    async fn insert_race(&self, race: Race) -> Result<(), RepositoryError> {
        let mut races = self.races.write().map_err(poisoned)?;
        if races.contains_key(&race.id) {
            return Err(RepositoryError::Conflict { field: "id" });
        }
        races.insert(race.id, race);
        debug!("Race inserted");
        Ok(())
    }

    #[instrument(skip(self, race), fields(race_id = %race.id))]
    async fn save_race(&self, race: Race) -> Result<(), RepositoryError> {
        match self.races.write() {
            Ok(mut races) => match races.get_mut(&race.id) {
                Some(existing) => {
                    *existing = race;
                    debug!("Race saved");
                    Ok(())
                }
                None => Err(RepositoryError::NotFound(race.id.to_string())),
            },
            Err(e) => Err(poisoned(e)),
        }
    }

    #[instrument(skip(self))]
    async fn get_race(&self, id: RaceId) -> Result<Option<Race>, RepositoryError> {
        let races = self.races.read().map_err(poisoned)?;
        Ok(races.get(&id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_races(&self) -> Result<Vec<Race>, RepositoryError> {
        let races = self.races.read().map_err(poisoned)?;
        Ok(newest_first(races.values().cloned().collect(), |r| {
            r.created_at
        }))
    }

    #[instrument(skip(self))]
    async fn delete_race(&self, id: RaceId) -> Result<bool, RepositoryError> {
        let mut races = self.races.write().map_err(poisoned)?;
        Ok(races.remove(&id).is_some())
    }
}

#[async_trait]
impl LobbyRepository for MemoryStorage {
    #[instrument(skip(self, lobby), fields(lobby_id = %lobby.id, code = %lobby.code))]
    async fn insert_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError> {
        let mut lobbies = self.lobbies.write().map_err(poisoned)?;
        if lobbies.values().any(|l| l.code == lobby.code) {
            debug!("Lobby code already taken");
            return Err(RepositoryError::Conflict { field: "code" });
        }
        lobbies.insert(lobby.id, lobby);
        Ok(())
    }

    #[instrument(skip(self, lobby), fields(lobby_id = %lobby.id))]
    async fn save_lobby(&self, lobby: Lobby) -> Result<(), RepositoryError> {
        let mut lobbies = self.lobbies.write().map_err(poisoned)?;
        if lobbies
            .values()
            .any(|l| l.id != lobby.id && l.code == lobby.code)
        {
            return Err(RepositoryError::Conflict { field: "code" });
        }
        match lobbies.get_mut(&lobby.id) {
            Some(existing) => {
                *existing = lobby;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(lobby.id.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn get_lobby(&self, id: LobbyId) -> Result<Option<Lobby>, RepositoryError> {
        let lobbies = self.lobbies.read().map_err(poisoned)?;
        Ok(lobbies.get(&id).cloned())
    }

    #[instrument(skip(self))]
    async fn get_lobby_by_code(&self, code: &str) -> Result<Option<Lobby>, RepositoryError> {
        let lobbies = self.lobbies.read().map_err(poisoned)?;
        Ok(lobbies.values().find(|l| l.code == code).cloned())
    }

    #[instrument(skip(self))]
    async fn list_lobbies(&self) -> Result<Vec<Lobby>, RepositoryError> {
        let lobbies = self.lobbies.read().map_err(poisoned)?;
        Ok(newest_first(lobbies.values().cloned().collect(), |l| {
            l.created_at
        }))
    }

    #[instrument(skip(self))]
    async fn delete_lobby(&self, id: LobbyId) -> Result<bool, RepositoryError> {
        let mut lobbies = self.lobbies.write().map_err(poisoned)?;
        Ok(lobbies.remove(&id).is_some())
    }

    #[instrument(skip(self))]
    async fn lobbies_with_team(&self, team_id: TeamId) -> Result<Vec<Lobby>, RepositoryError> {
        let lobbies = self.lobbies.read().map_err(poisoned)?;
        Ok(newest_first(
            lobbies
                .values()
                .filter(|l| l.has_team(team_id))
                .cloned()
                .collect(),
            |l| l.created_at,
        ))
    }
}

fn team_clash(teams: &HashMap<TeamId, Team>, team: &Team) -> Option<&'static str> {
    teams
        .values()
        .filter(|other| other.id != team.id)
        .find_map(|other| {
            if other.code == team.code {
                Some("code")
            } else if other.same_name(&team.name) {
                Some("name")
            } else {
                None
            }
        })
}

#[async_trait]
impl TeamRepository for MemoryStorage {
    #[instrument(skip(self, team), fields(team_id = %team.id, code = %team.code))]
    async fn insert_team(&self, team: Team) -> Result<(), RepositoryError> {
        let mut teams = self.teams.write().map_err(poisoned)?;
        if let Some(field) = team_clash(&teams, &team) {
            debug!(field, "Team clashes with an existing one");
            return Err(RepositoryError::Conflict { field });
        }
        teams.insert(team.id, team);
        Ok(())
    }

    #[instrument(skip(self, team), fields(team_id = %team.id))]
    async fn save_team(&self, team: Team) -> Result<(), RepositoryError> {
        let mut teams = self.teams.write().map_err(poisoned)?;
        if let Some(field) = team_clash(&teams, &team) {
            return Err(RepositoryError::Conflict { field });
        }
        match teams.get_mut(&team.id) {
            Some(existing) => {
                *existing = team;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(team.id.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn get_team(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        let teams = self.teams.read().map_err(poisoned)?;
        Ok(teams.get(&id).cloned())
    }

    #[instrument(skip(self))]
    async fn get_team_by_code(&self, code: &str) -> Result<Option<Team>, RepositoryError> {
        let teams = self.teams.read().map_err(poisoned)?;
        Ok(teams.values().find(|t| t.code == code).cloned())
    }

    #[instrument(skip(self))]
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        let teams = self.teams.read().map_err(poisoned)?;
        Ok(teams.values().find(|t| t.same_name(name)).cloned())
    }

    #[instrument(skip(self))]
    async fn list_teams(&self) -> Result<Vec<Team>, RepositoryError> {
        let teams = self.teams.read().map_err(poisoned)?;
        let mut teams: Vec<Team> = teams.values().cloned().collect();
        teams.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn delete_team(&self, id: TeamId) -> Result<bool, RepositoryError> {
        let mut teams = self.teams.write().map_err(poisoned)?;
        Ok(teams.remove(&id).is_some())
    }
}

#[async_trait]
impl ProgressRepository for MemoryStorage {
    #[instrument(skip(self))]
    async fn get_progress(
        &self,
        team_id: TeamId,
        race_id: RaceId,
    ) -> Result<Option<TeamRaceProgress>, RepositoryError> {
        let progress = self.progress.read().map_err(poisoned)?;
        Ok(progress.get(&(team_id, race_id)).cloned())
    }

    #[instrument(
        skip(self, progress),
        fields(team_id = %progress.team_id, race_id = %progress.race_id)
    )]
    async fn save_progress(&self, progress: TeamRaceProgress) -> Result<(), RepositoryError> {
        let mut rows = self.progress.write().map_err(poisoned)?;
        rows.insert((progress.team_id, progress.race_id), progress);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn progress_for_race(
        &self,
        race_id: RaceId,
    ) -> Result<Vec<TeamRaceProgress>, RepositoryError> {
        let rows = self.progress.read().map_err(poisoned)?;
        Ok(rows
            .values()
            .filter(|p| p.race_id == race_id)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn all_progress(&self) -> Result<Vec<TeamRaceProgress>, RepositoryError> {
        let rows = self.progress.read().map_err(poisoned)?;
        Ok(rows.values().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn get_answer(
        &self,
        team_id: TeamId,
        question_id: QuestionId,
    ) -> Result<Option<TeamAnswer>, RepositoryError> {
        let answers = self.answers.read().map_err(poisoned)?;
        Ok(answers.get(&(team_id, question_id)).cloned())
    }

    #[instrument(
        skip(self, answer),
        fields(team_id = %answer.team_id, question_id = %answer.question_id)
    )]
    async fn save_answer(&self, answer: TeamAnswer) -> Result<(), RepositoryError> {
        let mut answers = self.answers.write().map_err(poisoned)?;
        answers.insert((answer.team_id, answer.question_id), answer);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_team_records(&self, team_id: TeamId) -> Result<(), RepositoryError> {
        self.progress
            .write()
            .map_err(poisoned)?
            .retain(|(team, _), _| *team != team_id);
        self.answers
            .write()
            .map_err(poisoned)?
            .retain(|(team, _), _| *team != team_id);
        Ok(())
    }

    #[instrument(skip(self, question_ids))]
    async fn delete_race_records(
        &self,
        race_id: RaceId,
        question_ids: &[QuestionId],
    ) -> Result<(), RepositoryError> {
        self.progress
            .write()
            .map_err(poisoned)?
            .retain(|(_, race), _| *race != race_id);
        self.answers
            .write()
            .map_err(poisoned)?
            .retain(|(_, question), _| !question_ids.contains(question));
        Ok(())
    }
}

#[async_trait]
impl ConnectionRepository for MemoryStorage {
    #[instrument(skip(self, connection))]
    async fn add_connection(&self, connection: Connection) -> Result<(), RepositoryError> {
        debug!(?connection.client_id, topic = %connection.topic, "Adding connection");
        match self.connections.write() {
            Ok(mut connections) => {
                connections.insert(connection.client_id, connection);
                Ok(())
            }
            Err(e) => {
                error!(?e, "Failed to add connection");
                Err(RepositoryError::Lock(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn remove_connection(&self, id: ClientId) -> Result<Option<Connection>, RepositoryError> {
        debug!(?id, "Removing connection");
        match self.connections.write() {
            Ok(mut connections) => Ok(connections.remove(&id)),
            Err(e) => {
                error!(?e, "Failed to remove connection");
                Err(RepositoryError::Lock(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn connections_for_topic(
        &self,
        topic: Topic,
    ) -> Result<Vec<Connection>, RepositoryError> {
        let connections = self.connections.read().map_err(poisoned)?;
        let subscribed: Vec<Connection> = connections
            .values()
            .filter(|c| c.topic == topic)
            .cloned()
            .collect();
        debug!(%topic, count = subscribed.len(), "Connections for topic");
        Ok(subscribed)
    }

    #[instrument(skip(self))]
    async fn get_all_connections(&self) -> Result<Vec<Connection>, RepositoryError> {
        let connections = self.connections.read().map_err(poisoned)?;
        Ok(connections.values().cloned().collect())
    }
}
