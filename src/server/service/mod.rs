//! Business rules for races, lobbies, teams and scoring.

mod gameplay;
mod lobbies;
mod races;
mod standings;
mod teams;

#[cfg(test)]
pub(crate) mod test_support;

use super::{
    LobbyRepository, MemoryStorage, Notifier, ProgressRepository, RaceRepository,
    RepositoryError, TeamRepository,
};
use crate::model::{
    code, HuntError, HuntEvent, Lobby, LobbyId, PublicQuestion, QuestionId, Race, RaceId, Team,
    TeamId, TeamRaceProgress, TeamSummary, Timestamp, Topic,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub(crate) const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Clone)]
pub struct HuntService {
    races: Arc<dyn RaceRepository + Send + Sync>,
    lobbies: Arc<dyn LobbyRepository + Send + Sync>,
    teams: Arc<dyn TeamRepository + Send + Sync>,
    progress: Arc<dyn ProgressRepository + Send + Sync>,
    notifier: Notifier,
    upload_dir: PathBuf,
    /// Serialises membership changes so name and code checks hold.
    membership: Arc<Mutex<()>>,
    /// Serialises edits of a race aggregate, which is saved whole.
    race_edits: Arc<Mutex<()>>,
    /// Serialises scoring so an answer is never credited twice.
    scoring: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyDetails {
    pub lobby: Lobby,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedRace {
    pub lobby_id: LobbyId,
    pub race_id: RaceId,
    pub redirect_url: String,
    pub first_question_id: Option<QuestionId>,
    pub start_time: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamRace {
    pub team_id: TeamId,
    pub lobby_id: Option<LobbyId>,
    pub race_id: Option<RaceId>,
    pub hunt_started: bool,
    pub current_question_id: Option<QuestionId>,
    pub progress: Option<TeamRaceProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub lobby_id: LobbyId,
    pub race_id: RaceId,
    pub question: PublicQuestion,
    pub total_questions: usize,
    pub seconds_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoResult {
    pub stored: bool,
    pub pending_review: bool,
    pub next_question_id: Option<QuestionId>,
    pub race_complete: bool,
}

impl HuntService {
    pub fn new<S>(storage: S, notifier: Notifier, upload_dir: impl Into<PathBuf>) -> Self
    where
        S: RaceRepository
            + LobbyRepository
            + TeamRepository
            + ProgressRepository
            + Clone
            + Send
            + Sync
            + 'static,
    {
        Self {
            races: Arc::new(storage.clone()),
            lobbies: Arc::new(storage.clone()),
            teams: Arc::new(storage.clone()),
            progress: Arc::new(storage),
            notifier,
            upload_dir: upload_dir.into(),
            membership: Arc::new(Mutex::new(())),
            race_edits: Arc::new(Mutex::new(())),
            scoring: Arc::new(Mutex::new(())),
        }
    }

    /// Everything in memory, connections included.
    pub fn in_memory(upload_dir: impl Into<PathBuf>) -> Self {
        let storage = MemoryStorage::new();
        let notifier = Notifier::new(Arc::new(storage.clone()));
        Self::new(storage, notifier, upload_dir)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // ===== Lookups =====

    pub(crate) async fn race(&self, id: RaceId) -> Result<Race, HuntError> {
        self.races
            .get_race(id)
            .await?
            .ok_or(HuntError::RaceNotFound(id))
    }

    pub(crate) async fn lobby(&self, id: LobbyId) -> Result<Lobby, HuntError> {
        self.lobbies
            .get_lobby(id)
            .await?
            .ok_or(HuntError::LobbyNotFound(id))
    }

    pub(crate) async fn team(&self, id: TeamId) -> Result<Team, HuntError> {
        self.teams
            .get_team(id)
            .await?
            .ok_or(HuntError::TeamNotFound(id))
    }

    pub(crate) async fn team_by_code(&self, team_code: &str) -> Result<Team, HuntError> {
        let team_code = code::normalize(team_code);
        self.teams
            .get_team_by_code(&team_code)
            .await?
            .ok_or(HuntError::TeamCodeNotFound(team_code))
    }

    async fn team_summaries(&self, team_ids: &[TeamId]) -> Result<Vec<TeamSummary>, HuntError> {
        let mut summaries = Vec::with_capacity(team_ids.len());
        for team_id in team_ids {
            if let Some(team) = self.teams.get_team(*team_id).await? {
                summaries.push(TeamSummary::from(&team));
            }
        }
        Ok(summaries)
    }

    // ===== Broadcasts =====

    pub(crate) async fn broadcast(&self, topic: Topic, event: HuntEvent) {
        let delivered = self.notifier.publish(topic, &event).await;
        debug!(%topic, delivered, "Broadcast");
    }

    pub(crate) async fn broadcast_available_teams(&self) -> Result<(), HuntError> {
        if self.notifier.subscriber_count(Topic::AvailableTeams).await == 0 {
            return Ok(());
        }
        let event = self.available_teams_event().await?;
        self.broadcast(Topic::AvailableTeams, event).await;
        Ok(())
    }

    pub(crate) async fn broadcast_team_members(&self, team: &Team) {
        self.broadcast(
            Topic::Team(team.id),
            HuntEvent::TeamMembers {
                team_id: team.id,
                members: team.member_names(),
            },
        )
        .await;
    }

    async fn available_teams_event(&self) -> Result<HuntEvent, HuntError> {
        let teams = self.teams.list_teams().await?;
        Ok(HuntEvent::AvailableTeams {
            teams: teams.iter().map(TeamSummary::from).collect(),
        })
    }

    // ===== Live connection support =====

    /// Events sent to a fresh subscriber, and again on `get_data`.
    pub async fn snapshot(&self, topic: Topic) -> Result<Vec<HuntEvent>, HuntError> {
        let events = match topic {
            Topic::Lobby(lobby_id) => {
                let lobby = self.lobby(lobby_id).await?;
                vec![
                    HuntEvent::LobbyStatus {
                        status: self.hunt_status(lobby_id).await?,
                    },
                    HuntEvent::LobbyTeams {
                        lobby_id,
                        teams: self.team_summaries(&lobby.team_ids).await?,
                    },
                ]
            }
            Topic::Race(race_id) => vec![
                HuntEvent::RaceStatus {
                    status: self.race_status(race_id).await?,
                },
                HuntEvent::LeaderboardUpdate {
                    race_id: Some(race_id),
                    entries: self.leaderboard(Some(race_id)).await?,
                },
            ],
            Topic::Team(team_id) => {
                let team = self.team(team_id).await?;
                vec![HuntEvent::TeamMembers {
                    team_id,
                    members: team.member_names(),
                }]
            }
            Topic::Leaderboard => vec![HuntEvent::LeaderboardUpdate {
                race_id: None,
                entries: self.leaderboard(None).await?,
            }],
            Topic::AvailableTeams => vec![self.available_teams_event().await?],
        };
        Ok(events)
    }

    /// Reply to a `check_status` request.
    pub async fn status_event(&self, topic: Topic) -> Result<HuntEvent, HuntError> {
        match topic {
            Topic::Lobby(lobby_id) => Ok(HuntEvent::LobbyStatus {
                status: self.hunt_status(lobby_id).await?,
            }),
            Topic::Race(race_id) => Ok(HuntEvent::RaceStatus {
                status: self.race_status(race_id).await?,
            }),
            other => self
                .snapshot(other)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| HuntError::Storage(format!("no snapshot for {}", other))),
        }
    }

    /// Confirms the topic's subject exists before a socket is accepted.
    pub async fn ensure_topic(&self, topic: Topic) -> Result<(), HuntError> {
        match topic {
            Topic::Lobby(id) => self.lobby(id).await.map(|_| ()),
            Topic::Race(id) => self.race(id).await.map(|_| ()),
            Topic::Team(id) => self.team(id).await.map(|_| ()),
            Topic::Leaderboard | Topic::AvailableTeams => Ok(()),
        }
    }
}

pub(crate) fn is_code_conflict(error: &RepositoryError) -> bool {
    matches!(error, RepositoryError::Conflict { field: "code" })
}
