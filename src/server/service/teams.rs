use super::{is_code_conflict, HuntService, TeamRace, MAX_CODE_ATTEMPTS};
use crate::model::{
    code, validation, HuntError, HuntEvent, LobbyAction, LobbyId, MemberSummary, Team, TeamId,
    TeamSummary, Topic,
};
use crate::server::RepositoryError;
use tracing::{info, instrument, warn};

impl HuntService {
    /// Creates a team with its first member and a fresh code.
    async fn insert_new_team(&self, team_name: &str, player_name: &str) -> Result<Team, HuntError> {
        let team_name = validation::name("team_name", team_name)?;
        if self.teams.get_team_by_name(&team_name).await?.is_some() {
            return Err(HuntError::TeamNameTaken);
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            let team_code = code::generate_code(&mut rand::thread_rng());
            let mut team = Team::new(&team_name, team_code)?;
            team.add_member(player_name)?;
            match self.teams.insert_team(team.clone()).await {
                Ok(()) => {
                    info!(team_id = %team.id, code = %team.code, "Team created");
                    return Ok(team);
                }
                Err(e) if is_code_conflict(&e) => {
                    warn!(code = %team.code, "Team code collision, retrying");
                }
                Err(RepositoryError::Conflict { field: "name" }) => {
                    return Err(HuntError::TeamNameTaken)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(HuntError::CodeExhausted)
    }

    #[instrument(skip(self))]
    pub async fn create_team_in_lobby(
        &self,
        lobby_id: LobbyId,
        team_name: &str,
        player_name: &str,
    ) -> Result<Team, HuntError> {
        let _guard = self.membership.lock().await;
        let mut lobby = self.lobby(lobby_id).await?;
        if !lobby.is_active {
            return Err(HuntError::LobbyInactive);
        }

        let team = self.insert_new_team(team_name, player_name).await?;
        lobby.add_team(team.id);
        self.lobbies.save_lobby(lobby).await?;

        self.broadcast(
            Topic::Lobby(lobby_id),
            HuntEvent::TeamJoined {
                lobby_id,
                team: TeamSummary::from(&team),
            },
        )
        .await;
        self.broadcast_team_members(&team).await;
        self.broadcast_available_teams().await?;
        Ok(team)
    }

    #[instrument(skip(self))]
    pub async fn create_standalone_team(
        &self,
        team_name: &str,
        player_name: &str,
    ) -> Result<Team, HuntError> {
        let _guard = self.membership.lock().await;
        let team = self.insert_new_team(team_name, player_name).await?;
        self.broadcast_available_teams().await?;
        Ok(team)
    }

    /// Adds a player to the team behind `team_code`, and the team to the lobby when given.
    #[instrument(skip(self))]
    pub async fn join_team(
        &self,
        team_code: &str,
        player_name: &str,
        lobby_id: Option<LobbyId>,
    ) -> Result<Team, HuntError> {
        let _guard = self.membership.lock().await;
        let mut team = self.team_by_code(team_code).await?;
        let mut lobby = match lobby_id {
            Some(lobby_id) => {
                let lobby = self.lobby(lobby_id).await?;
                if !lobby.is_active {
                    return Err(HuntError::LobbyInactive);
                }
                Some(lobby)
            }
            None => None,
        };

        let member = MemberSummary {
            name: team.add_member(player_name)?.name.clone(),
        };
        self.teams.save_team(team.clone()).await?;
        info!(team_id = %team.id, player = %member.name, "Player joined team");

        if let Some(lobby) = lobby.as_mut() {
            if lobby.add_team(team.id) {
                self.lobbies.save_lobby(lobby.clone()).await?;
                self.broadcast(
                    Topic::Lobby(lobby.id),
                    HuntEvent::TeamJoined {
                        lobby_id: lobby.id,
                        team: TeamSummary::from(&team),
                    },
                )
                .await;
            }
        }

        for lobby in self.lobbies.lobbies_with_team(team.id).await? {
            self.broadcast(
                Topic::Lobby(lobby.id),
                HuntEvent::TeamMemberJoined {
                    team_id: team.id,
                    team_name: team.name.clone(),
                    member: member.clone(),
                },
            )
            .await;
        }
        self.broadcast_team_members(&team).await;
        self.broadcast_available_teams().await?;
        Ok(team)
    }

    #[instrument(skip(self))]
    pub async fn leave_lobby(&self, lobby_id: LobbyId, team_id: TeamId) -> Result<(), HuntError> {
        let _guard = self.membership.lock().await;
        let mut lobby = self.lobby(lobby_id).await?;
        if lobby.hunt_started {
            return Err(HuntError::RaceAlreadyStarted);
        }
        if !lobby.remove_team(team_id) {
            return Err(HuntError::TeamNotInLobby);
        }
        self.lobbies.save_lobby(lobby).await?;

        self.broadcast(
            Topic::Lobby(lobby_id),
            HuntEvent::TeamLeft { lobby_id, team_id },
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn rename_team(&self, id: TeamId, name: &str) -> Result<Team, HuntError> {
        let _guard = self.membership.lock().await;
        let mut team = self.team(id).await?;
        let name = validation::name("team_name", name)?;
        if let Some(other) = self.teams.get_team_by_name(&name).await? {
            if other.id != id {
                return Err(HuntError::TeamNameTaken);
            }
        }
        team.name = name;
        match self.teams.save_team(team.clone()).await {
            Err(RepositoryError::Conflict { field: "name" }) => {
                return Err(HuntError::TeamNameTaken)
            }
            other => other?,
        }
        self.broadcast_available_teams().await?;
        Ok(team)
    }

    /// Removes the team from its lobbies and drops its scores.
    #[instrument(skip(self))]
    pub async fn delete_team(&self, id: TeamId) -> Result<(), HuntError> {
        let _guard = self.membership.lock().await;
        let team = self.team(id).await?;

        for mut lobby in self.lobbies.lobbies_with_team(id).await? {
            lobby.remove_team(id);
            self.lobbies.save_lobby(lobby.clone()).await?;
            self.broadcast(
                Topic::Lobby(lobby.id),
                HuntEvent::LobbyUpdate {
                    lobby_id: lobby.id,
                    action: LobbyAction::TeamDeleted,
                    is_active: lobby.is_active,
                    team_id: Some(id),
                },
            )
            .await;
            self.broadcast(
                Topic::Lobby(lobby.id),
                HuntEvent::TeamLeft {
                    lobby_id: lobby.id,
                    team_id: id,
                },
            )
            .await;
        }

        self.progress.delete_team_records(id).await?;
        self.teams.delete_team(id).await?;
        info!(team_id = %id, name = %team.name, "Team deleted");

        self.broadcast_available_teams().await?;
        self.publish_leaderboards(None).await?;
        Ok(())
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, HuntError> {
        Ok(self.teams.list_teams().await?)
    }

    pub async fn get_team(&self, id: TeamId) -> Result<Team, HuntError> {
        self.team(id).await
    }

    /// The lobby and race a team is playing: a started lobby wins over a waiting one.
    pub async fn team_race(&self, team_id: TeamId) -> Result<TeamRace, HuntError> {
        self.team(team_id).await?;
        let lobbies = self.lobbies.lobbies_with_team(team_id).await?;
        let lobby = lobbies
            .iter()
            .find(|lobby| lobby.hunt_started)
            .or_else(|| lobbies.first());

        let Some(lobby) = lobby else {
            return Ok(TeamRace {
                team_id,
                lobby_id: None,
                race_id: None,
                hunt_started: false,
                current_question_id: None,
                progress: None,
            });
        };

        let (progress, current_question_id) = match lobby.race_id {
            Some(race_id) => {
                let progress = self.progress.get_progress(team_id, race_id).await?;
                let current = match (&progress, self.races.get_race(race_id).await?) {
                    (Some(progress), Some(race)) => race
                        .ordered_questions()
                        .nth(progress.current_question_index)
                        .map(|(_, q)| q.id),
                    (None, Some(race)) if lobby.hunt_started => race.first_question().map(|q| q.id),
                    _ => None,
                };
                (progress, current)
            }
            None => (None, None),
        };

        Ok(TeamRace {
            team_id,
            lobby_id: Some(lobby.id),
            race_id: lobby.race_id,
            hunt_started: lobby.hunt_started,
            current_question_id,
            progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::model::{HuntError, HuntEvent, Topic};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn team_names_are_unique_ignoring_case() {
        for fixture in Fixture::each_store() {
            fixture
                .service
                .create_standalone_team("Owls", "alice")
                .await
                .unwrap();

            let result = fixture.service.create_standalone_team(" owls ", "bob").await;

            assert_eq!(result.unwrap_err(), HuntError::TeamNameTaken);
        }
    }

    #[tokio::test]
    async fn joining_twice_with_same_name_is_refused() {
        for fixture in Fixture::each_store() {
            let team = fixture
                .service
                .create_standalone_team("Owls", "alice")
                .await
                .unwrap();

            let result = fixture.service.join_team(&team.code, "alice", None).await;

            assert_eq!(result.unwrap_err(), HuntError::AlreadyMember);
        }
    }

    #[tokio::test]
    async fn join_with_lobby_adds_team_and_notifies() {
        let fixture = Fixture::new();
        let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();
        let team = fixture
            .service
            .create_standalone_team("Owls", "alice")
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        fixture
            .service
            .notifier()
            .subscribe(Topic::Lobby(lobby.id), tx)
            .await
            .unwrap();

        let joined = fixture
            .service
            .join_team(&team.code.to_lowercase(), "bob", Some(lobby.id))
            .await
            .unwrap();

        assert_eq!(joined.member_names(), vec!["alice", "bob"]);
        let events = drain(&mut rx);
        assert!(matches!(events[0], HuntEvent::TeamJoined { .. }));
        assert!(matches!(events[1], HuntEvent::TeamMemberJoined { .. }));
        let details = fixture.service.lobby_details(lobby.id).await.unwrap();
        assert_eq!(details.teams.len(), 1);
    }

    #[tokio::test]
    async fn unknown_team_code_is_not_found() {
        let fixture = Fixture::new();
        let result = fixture.service.join_team("NOPE00", "bob", None).await;
        assert!(matches!(result, Err(HuntError::TeamCodeNotFound(_))));
    }

    #[tokio::test]
    async fn cannot_leave_after_start() {
        let fixture = Fixture::new();
        let (lobby, team, _race) = fixture.started_lobby().await;

        let result = fixture.service.leave_lobby(lobby.id, team.id).await;

        assert_eq!(result.unwrap_err(), HuntError::RaceAlreadyStarted);
    }

    #[tokio::test]
    async fn leaving_broadcasts_team_left() {
        let fixture = Fixture::new();
        let lobby = fixture.service.create_lobby("Hall", None).await.unwrap();
        let team = fixture
            .service
            .create_team_in_lobby(lobby.id, "Owls", "alice")
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        fixture
            .service
            .notifier()
            .subscribe(Topic::Lobby(lobby.id), tx)
            .await
            .unwrap();

        fixture.service.leave_lobby(lobby.id, team.id).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![HuntEvent::TeamLeft {
                lobby_id: lobby.id,
                team_id: team.id
            }]
        );
        assert_eq!(
            fixture.service.leave_lobby(lobby.id, team.id).await.unwrap_err(),
            HuntError::TeamNotInLobby
        );
    }

    #[tokio::test]
    async fn rename_rejects_taken_names() {
        let fixture = Fixture::new();
        fixture
            .service
            .create_standalone_team("Owls", "alice")
            .await
            .unwrap();
        let hawks = fixture
            .service
            .create_standalone_team("Hawks", "bob")
            .await
            .unwrap();

        assert_eq!(
            fixture.service.rename_team(hawks.id, "OWLS").await.unwrap_err(),
            HuntError::TeamNameTaken
        );
        let renamed = fixture.service.rename_team(hawks.id, "Falcons").await.unwrap();
        assert_eq!(renamed.name, "Falcons");
    }

    #[tokio::test]
    async fn deleting_team_removes_it_from_lobbies_and_board() {
        for fixture in Fixture::each_store() {
            let (lobby, team, race) = fixture.started_lobby().await;

            fixture.service.delete_team(team.id).await.unwrap();

            let details = fixture.service.lobby_details(lobby.id).await.unwrap();
            assert!(details.teams.is_empty());
            assert!(fixture
                .service
                .leaderboard(Some(race.id))
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn team_race_points_at_current_question() {
        let fixture = Fixture::new();
        let (_lobby, team, race) = fixture.started_lobby().await;

        let playing = fixture.service.team_race(team.id).await.unwrap();

        assert!(playing.hunt_started);
        assert_eq!(playing.race_id, Some(race.id));
        assert_eq!(
            playing.current_question_id,
            Some(race.zones[0].questions[0].id)
        );
    }
}
