use super::RepositoryError;
use crate::model::{QuestionId, RaceId, TeamAnswer, TeamId, TeamRaceProgress};
use async_trait::async_trait;

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn get_progress(
        &self,
        team_id: TeamId,
        race_id: RaceId,
    ) -> Result<Option<TeamRaceProgress>, RepositoryError>;

    async fn save_progress(&self, progress: TeamRaceProgress) -> Result<(), RepositoryError>;

    async fn progress_for_race(
        &self,
        race_id: RaceId,
    ) -> Result<Vec<TeamRaceProgress>, RepositoryError>;

    async fn all_progress(&self) -> Result<Vec<TeamRaceProgress>, RepositoryError>;

    async fn get_answer(
        &self,
        team_id: TeamId,
        question_id: QuestionId,
    ) -> Result<Option<TeamAnswer>, RepositoryError>;

    async fn save_answer(&self, answer: TeamAnswer) -> Result<(), RepositoryError>;

    /// Drops every progress row and answer of a team.
    async fn delete_team_records(&self, team_id: TeamId) -> Result<(), RepositoryError>;

    /// Drops progress for a race and the answers to its questions.
    async fn delete_race_records(
        &self,
        race_id: RaceId,
        question_ids: &[QuestionId],
    ) -> Result<(), RepositoryError>;
}
