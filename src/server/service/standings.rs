use super::HuntService;
use crate::model::leaderboard::{rank, Standing};
use crate::model::{HuntError, HuntEvent, LeaderboardEntry, RaceId, Topic};
use std::collections::HashMap;
use tracing::instrument;

impl HuntService {
    /// Standings for one race, or across every race when `race_id` is `None`.
    #[instrument(skip(self))]
    pub async fn leaderboard(
        &self,
        race_id: Option<RaceId>,
    ) -> Result<Vec<LeaderboardEntry>, HuntError> {
        let standings = match race_id {
            Some(race_id) => self.race_standings(race_id).await?,
            None => self.global_standings().await?,
        };
        Ok(rank(standings))
    }

    async fn race_standings(&self, race_id: RaceId) -> Result<Vec<Standing>, HuntError> {
        let race = self.race(race_id).await?;
        let total_questions = race.total_questions();
        let mut standings = Vec::new();
        for progress in self.progress.progress_for_race(race_id).await? {
            // Rows can outlive a team deleted mid-race.
            let Some(team) = self.teams.get_team(progress.team_id).await? else {
                continue;
            };
            standings.push(Standing {
                team_id: team.id,
                name: team.name,
                points: progress.score,
                questions_answered: progress.questions_answered,
                total_questions,
                last_update: Some(progress.last_update),
            });
        }
        Ok(standings)
    }

    async fn global_standings(&self) -> Result<Vec<Standing>, HuntError> {
        let mut totals: HashMap<RaceId, usize> = HashMap::new();
        let mut by_team: HashMap<_, Vec<_>> = HashMap::new();
        for progress in self.progress.all_progress().await? {
            if !totals.contains_key(&progress.race_id) {
                let total = self
                    .races
                    .get_race(progress.race_id)
                    .await?
                    .map(|race| race.total_questions())
                    .unwrap_or_default();
                totals.insert(progress.race_id, total);
            }
            by_team
                .entry(progress.team_id)
                .or_insert_with(Vec::new)
                .push(progress);
        }

        let standings = self
            .teams
            .list_teams()
            .await?
            .into_iter()
            .map(|team| {
                let rows = by_team.remove(&team.id).unwrap_or_default();
                Standing {
                    team_id: team.id,
                    name: team.name,
                    points: rows.iter().map(|p| p.score).sum(),
                    questions_answered: rows.iter().map(|p| p.questions_answered).sum(),
                    total_questions: rows
                        .iter()
                        .map(|p| totals.get(&p.race_id).copied().unwrap_or_default())
                        .sum(),
                    last_update: rows.iter().map(|p| p.last_update).max(),
                }
            })
            .collect();
        Ok(standings)
    }

    /// Recomputes a board and pushes it to its subscribers.
    pub async fn refresh_leaderboard(
        &self,
        race_id: Option<RaceId>,
    ) -> Result<Vec<LeaderboardEntry>, HuntError> {
        let entries = self.leaderboard(race_id).await?;
        let topic = race_id.map(Topic::Race).unwrap_or(Topic::Leaderboard);
        self.broadcast(
            topic,
            HuntEvent::LeaderboardUpdate {
                race_id,
                entries: entries.clone(),
            },
        )
        .await;
        Ok(entries)
    }

    /// Pushes the race board, when given, and the global board to whoever listens.
    pub(crate) async fn publish_leaderboards(
        &self,
        race_id: Option<RaceId>,
    ) -> Result<(), HuntError> {
        if let Some(race_id) = race_id {
            if self.notifier.subscriber_count(Topic::Race(race_id)).await > 0 {
                self.refresh_leaderboard(Some(race_id)).await?;
            }
        }
        if self.notifier.subscriber_count(Topic::Leaderboard).await > 0 {
            self.refresh_leaderboard(None).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::model::{HuntEvent, Topic};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn race_board_orders_by_points() {
        let fixture = Fixture::new();
        let (lobby, owls, race) = fixture.started_lobby().await;
        let question = race.zones[0].questions[0].id;
        fixture
            .service
            .check_answer(lobby.id, question, &owls.code, "answer0")
            .await
            .unwrap();

        let board = fixture.service.leaderboard(Some(race.id)).await.unwrap();

        assert_eq!(board.len(), 1);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].name, "Owls");
        assert_eq!(board[0].points, 10);
        assert_eq!(board[0].total_questions, 2);
        assert_eq!(board[0].progress_percent, 50);
    }

    #[tokio::test]
    async fn global_board_lists_teams_without_progress_last() {
        let fixture = Fixture::new();
        let (lobby, owls, race) = fixture.started_lobby().await;
        fixture
            .service
            .create_standalone_team("Aardvarks", "dave")
            .await
            .unwrap();
        fixture
            .service
            .check_answer(lobby.id, race.zones[0].questions[0].id, &owls.code, "answer0")
            .await
            .unwrap();

        let board = fixture.service.leaderboard(None).await.unwrap();

        assert_eq!(board.len(), 2);
        assert_eq!(board[0].name, "Owls");
        assert_eq!(board[0].total_questions, 2);
        assert_eq!(board[1].name, "Aardvarks");
        assert_eq!(board[1].points, 0);
        assert_eq!(board[1].total_questions, 0);
    }

    #[tokio::test]
    async fn refresh_pushes_to_the_matching_topic() {
        let fixture = Fixture::new();
        let (_lobby, _team, race) = fixture.started_lobby().await;
        let (tx, mut rx) = mpsc::channel(8);
        fixture
            .service
            .notifier()
            .subscribe(Topic::Race(race.id), tx)
            .await
            .unwrap();

        let entries = fixture
            .service
            .refresh_leaderboard(Some(race.id))
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            HuntEvent::LeaderboardUpdate { race_id, entries: pushed } => {
                assert_eq!(*race_id, Some(race.id));
                assert_eq!(pushed, &entries);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
