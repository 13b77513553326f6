use super::{validation, HuntError, LobbyId, Race, RaceId, TeamId, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Waiting room where teams gather before the organizer starts a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lobby {
    pub id: LobbyId,
    pub name: String,
    pub code: String,
    pub race_id: Option<RaceId>,
    pub is_active: bool,
    pub hunt_started: bool,
    pub start_time: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub team_ids: Vec<TeamId>,
}

impl Lobby {
    pub fn new(name: &str, code: String, race_id: Option<RaceId>) -> Result<Self, HuntError> {
        let now = Utc::now();
        Ok(Lobby {
            id: Uuid::new_v4(),
            name: validation::name("name", name)?,
            code,
            race_id,
            is_active: true,
            hunt_started: false,
            start_time: None,
            created_at: now,
            updated_at: now,
            team_ids: Vec::new(),
        })
    }

    pub fn has_team(&self, team_id: TeamId) -> bool {
        self.team_ids.contains(&team_id)
    }

    /// Returns false when the team was already in the lobby.
    pub fn add_team(&mut self, team_id: TeamId) -> bool {
        if self.has_team(team_id) {
            return false;
        }
        self.team_ids.push(team_id);
        self.touch();
        true
    }

    pub fn remove_team(&mut self, team_id: TeamId) -> bool {
        let before = self.team_ids.len();
        self.team_ids.retain(|id| *id != team_id);
        let removed = self.team_ids.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn start(&mut self, race_id: RaceId, at: Timestamp) -> Result<(), HuntError> {
        if !self.is_active {
            return Err(HuntError::LobbyInactive);
        }
        if self.hunt_started {
            return Err(HuntError::RaceAlreadyStarted);
        }
        self.race_id = Some(race_id);
        self.hunt_started = true;
        self.start_time = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn toggle(&mut self) -> bool {
        self.is_active = !self.is_active;
        self.touch();
        self.is_active
    }

    pub fn detach_race(&mut self, race_id: RaceId) -> bool {
        if self.race_id != Some(race_id) {
            return false;
        }
        self.race_id = None;
        self.hunt_started = false;
        self.start_time = None;
        self.touch();
        true
    }

    /// Time left for the started race, clamped to zero. `None` before start.
    pub fn time_remaining(&self, race: &Race, now: Timestamp) -> Option<Duration> {
        let start = self.start_time.filter(|_| self.hunt_started)?;
        let remaining = race.deadline(start) - now;
        Some(remaining.max(Duration::zero()))
    }

    /// Time is up once strictly more than the limit has elapsed.
    pub fn is_time_up(&self, race: &Race, now: Timestamp) -> bool {
        match self.start_time.filter(|_| self.hunt_started) {
            Some(start) => now - start > race.time_limit(),
            None => false,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
