use super::{is_code_conflict, HuntService, LobbyDetails, StartedRace, MAX_CODE_ATTEMPTS};
use crate::model::{
    code, HuntError, HuntEvent, HuntStatus, Lobby, LobbyAction, LobbyId, RaceId,
    TeamRaceProgress, Topic,
};
use chrono::Utc;
use tracing::{info, instrument, warn};

impl HuntService {
    #[instrument(skip(self))]
    pub async fn create_lobby(
        &self,
        name: &str,
        race_id: Option<RaceId>,
    ) -> Result<Lobby, HuntError> {
        if let Some(race_id) = race_id {
            if !self.race(race_id).await?.is_active {
                return Err(HuntError::RaceInactive);
            }
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            let lobby_code = code::generate_code(&mut rand::thread_rng());
            let lobby = Lobby::new(name, lobby_code, race_id)?;
            match self.lobbies.insert_lobby(lobby.clone()).await {
                Ok(()) => {
                    info!(lobby_id = %lobby.id, code = %lobby.code, "Lobby created");
                    return Ok(lobby);
                }
                Err(e) if is_code_conflict(&e) => {
                    warn!(code = %lobby.code, "Lobby code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(HuntError::CodeExhausted)
    }

    pub async fn list_lobbies(&self) -> Result<Vec<Lobby>, HuntError> {
        Ok(self.lobbies.list_lobbies().await?)
    }

    pub async fn lobby_details(&self, id: LobbyId) -> Result<LobbyDetails, HuntError> {
        let lobby = self.lobby(id).await?;
        let mut teams = Vec::with_capacity(lobby.team_ids.len());
        for team_id in &lobby.team_ids {
            if let Some(team) = self.teams.get_team(*team_id).await? {
                teams.push(team);
            }
        }
        Ok(LobbyDetails { lobby, teams })
    }

    #[instrument(skip(self))]
    pub async fn toggle_lobby(&self, id: LobbyId) -> Result<Lobby, HuntError> {
        let (lobby, is_active) = {
            let _guard = self.membership.lock().await;
            let mut lobby = self.lobby(id).await?;
            let is_active = lobby.toggle();
            self.lobbies.save_lobby(lobby.clone()).await?;
            (lobby, is_active)
        };
        self.broadcast(
            Topic::Lobby(id),
            HuntEvent::LobbyUpdate {
                lobby_id: id,
                action: LobbyAction::LobbyToggled,
                is_active,
                team_id: None,
            },
        )
        .await;
        Ok(lobby)
    }

    #[instrument(skip(self))]
    pub async fn delete_lobby(&self, id: LobbyId) -> Result<(), HuntError> {
        {
            let _guard = self.membership.lock().await;
            self.lobby(id).await?;
            self.lobbies.delete_lobby(id).await?;
        }
        self.broadcast(
            Topic::Lobby(id),
            HuntEvent::LobbyUpdate {
                lobby_id: id,
                action: LobbyAction::LobbyDeleted,
                is_active: false,
                team_id: None,
            },
        )
        .await;
        info!(lobby_id = %id, "Lobby deleted");
        Ok(())
    }

    /// Resolves a code typed by a player. Inactive lobbies cannot be joined.
    pub async fn find_lobby_by_code(&self, lobby_code: &str) -> Result<Lobby, HuntError> {
        let lobby_code = code::normalize(lobby_code);
        let lobby = self
            .lobbies
            .get_lobby_by_code(&lobby_code)
            .await?
            .ok_or(HuntError::LobbyCodeNotFound(lobby_code))?;
        if !lobby.is_active {
            return Err(HuntError::LobbyInactive);
        }
        Ok(lobby)
    }

    /// Polled by clients that missed the start broadcast.
    pub async fn hunt_status(&self, id: LobbyId) -> Result<HuntStatus, HuntError> {
        let lobby = self.lobby(id).await?;
        let race = match lobby.race_id {
            Some(race_id) => self.races.get_race(race_id).await?,
            None => None,
        };

        let (first_question_id, seconds_remaining) = match (&race, lobby.hunt_started) {
            (Some(race), true) => (
                race.first_question().map(|q| q.id),
                lobby
                    .time_remaining(race, Utc::now())
                    .map(|left| left.num_seconds()),
            ),
            _ => (None, None),
        };

        Ok(HuntStatus {
            lobby_id: lobby.id,
            is_active: lobby.is_active,
            hunt_started: lobby.hunt_started,
            race_id: lobby.race_id,
            first_question_id,
            start_time: lobby.start_time,
            seconds_remaining,
        })
    }

    #[instrument(skip(self))]
    pub async fn start_race(
        &self,
        lobby_id: LobbyId,
        race_id: Option<RaceId>,
    ) -> Result<StartedRace, HuntError> {
        let _guard = self.membership.lock().await;
        let mut lobby = self.lobby(lobby_id).await?;
        if !lobby.is_active {
            return Err(HuntError::LobbyInactive);
        }
        if lobby.hunt_started {
            return Err(HuntError::RaceAlreadyStarted);
        }

        let race_id = race_id.or(lobby.race_id).ok_or(HuntError::NoRaceSelected)?;
        let race = self.race(race_id).await?;
        if !race.is_active {
            return Err(HuntError::RaceInactive);
        }
        let first_question_id = race
            .first_question()
            .map(|q| q.id)
            .ok_or(HuntError::RaceHasNoQuestions)?;

        if lobby.team_ids.is_empty() {
            return Err(HuntError::NoTeams);
        }
        for team_id in &lobby.team_ids {
            let team = self.team(*team_id).await?;
            if team.members.is_empty() {
                return Err(HuntError::EmptyTeam);
            }
        }

        let start_time = Utc::now();
        lobby.start(race_id, start_time)?;
        self.lobbies.save_lobby(lobby.clone()).await?;

        for team_id in &lobby.team_ids {
            if self.progress.get_progress(*team_id, race_id).await?.is_none() {
                self.progress
                    .save_progress(TeamRaceProgress::new(*team_id, race_id))
                    .await?;
            }
        }
        info!(%lobby_id, %race_id, teams = lobby.team_ids.len(), "Race started");

        let redirect_url = format!("/api/lobbies/{}/questions/{}", lobby_id, first_question_id);
        self.broadcast(
            Topic::Lobby(lobby_id),
            HuntEvent::RaceStatusChanged {
                lobby_id,
                status: "started".to_string(),
                race_id: Some(race_id),
            },
        )
        .await;
        let started = HuntEvent::RaceStarted {
            lobby_id,
            race_id,
            redirect_url: redirect_url.clone(),
            first_question_id: Some(first_question_id),
            start_time,
        };
        self.broadcast(Topic::Lobby(lobby_id), started.clone()).await;
        self.broadcast(Topic::Race(race_id), started).await;
        self.publish_leaderboards(Some(race_id)).await?;

        Ok(StartedRace {
            lobby_id,
            race_id,
            redirect_url,
            first_question_id: Some(first_question_id),
            start_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::model::{HuntError, HuntEvent, Topic};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn lobby_codes_resolve_case_insensitively() {
        let fixture = Fixture::new();
        let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();

        let found = fixture
            .service
            .find_lobby_by_code(&format!(" {} ", lobby.code.to_lowercase()))
            .await
            .unwrap();

        assert_eq!(found.id, lobby.id);
    }

    #[tokio::test]
    async fn inactive_lobbies_cannot_be_found_by_code() {
        let fixture = Fixture::new();
        let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();
        fixture.service.toggle_lobby(lobby.id).await.unwrap();

        let result = fixture.service.find_lobby_by_code(&lobby.code).await;

        assert_eq!(result.unwrap_err(), HuntError::LobbyInactive);
        assert!(matches!(
            fixture.service.find_lobby_by_code("ZZZZZZ").await,
            Err(HuntError::LobbyCodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn lobby_for_inactive_race_is_refused() {
        let fixture = Fixture::new();
        let race = fixture.race_with_questions(1).await;
        fixture.service.toggle_race(race.id).await.unwrap();

        let result = fixture.service.create_lobby("Hall", Some(race.id)).await;

        assert_eq!(result.unwrap_err(), HuntError::RaceInactive);
    }

    #[tokio::test]
    async fn start_requires_race_teams_and_members() {
        for fixture in Fixture::each_store() {
            let empty_race = fixture.race_with_questions(0).await;
            let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();

            assert_eq!(
                fixture.service.start_race(lobby.id, None).await.unwrap_err(),
                HuntError::NoRaceSelected
            );
            assert_eq!(
                fixture
                    .service
                    .start_race(lobby.id, Some(empty_race.id))
                    .await
                    .unwrap_err(),
                HuntError::RaceHasNoQuestions
            );

            let race = fixture.race_with_questions(2).await;
            assert_eq!(
                fixture
                    .service
                    .start_race(lobby.id, Some(race.id))
                    .await
                    .unwrap_err(),
                HuntError::NoTeams
            );
        }
    }

    #[tokio::test]
    async fn start_broadcasts_to_lobby_and_race() {
        let fixture = Fixture::new();
        let race = fixture.race_with_questions(2).await;
        let lobby = fixture
            .service
            .create_lobby("Hall", Some(race.id))
            .await
            .unwrap();
        fixture
            .service
            .create_team_in_lobby(lobby.id, "Owls", "alice")
            .await
            .unwrap();

        let (lobby_tx, mut lobby_rx) = mpsc::channel(8);
        let (race_tx, mut race_rx) = mpsc::channel(8);
        let notifier = fixture.service.notifier();
        notifier.subscribe(Topic::Lobby(lobby.id), lobby_tx).await.unwrap();
        notifier.subscribe(Topic::Race(race.id), race_tx).await.unwrap();

        let started = fixture.service.start_race(lobby.id, None).await.unwrap();

        assert_eq!(started.first_question_id, Some(race.zones[0].questions[0].id));
        let lobby_events = drain(&mut lobby_rx);
        assert!(matches!(lobby_events[0], HuntEvent::RaceStatusChanged { .. }));
        assert!(matches!(lobby_events[1], HuntEvent::RaceStarted { .. }));
        let race_events = drain(&mut race_rx);
        assert!(race_events
            .iter()
            .any(|e| matches!(e, HuntEvent::RaceStarted { .. })));

        let status = fixture.service.hunt_status(lobby.id).await.unwrap();
        assert!(status.hunt_started);
        assert_eq!(status.first_question_id, started.first_question_id);
        assert!(status.seconds_remaining.unwrap() > 0);

        assert_eq!(
            fixture.service.start_race(lobby.id, None).await.unwrap_err(),
            HuntError::RaceAlreadyStarted
        );
    }

    #[tokio::test]
    async fn unknown_lobby_is_not_found() {
        let fixture = Fixture::new();
        let result = fixture.service.hunt_status(Uuid::new_v4()).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn toggling_never_drops_joining_teams() {
        for fixture in Fixture::each_store() {
            let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();

            let mut handles = Vec::new();
            for i in 0..8 {
                let service = fixture.service.clone();
                handles.push(tokio::spawn(async move {
                    service
                        .create_team_in_lobby(lobby.id, &format!("Team {}", i), "alice")
                        .await
                        .map(|team| team.id)
                }));
            }
            let mut toggles = Vec::new();
            for _ in 0..8 {
                let service = fixture.service.clone();
                toggles.push(tokio::spawn(async move { service.toggle_lobby(lobby.id).await }));
            }
            for toggle in toggles {
                toggle.await.unwrap().unwrap();
            }

            let mut joined = Vec::new();
            for handle in handles {
                // A join may land while the lobby is switched off.
                match handle.await.unwrap() {
                    Ok(team_id) => joined.push(team_id),
                    Err(e) => assert_eq!(e, HuntError::LobbyInactive),
                }
            }

            let lobby = fixture.service.lobby(lobby.id).await.unwrap();
            assert!(lobby.is_active);
            assert_eq!(lobby.team_ids.len(), joined.len());
            for team_id in joined {
                assert!(lobby.team_ids.contains(&team_id));
            }
        }
    }
}
