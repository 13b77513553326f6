use super::{HuntService, PhotoResult, QuestionView};
use crate::model::{
    scoring, AnswerResult, HuntError, HuntEvent, Lobby, LobbyId, QuestionId, Race, RaceId,
    Team, TeamAnswer, TeamRaceProgress, Topic,
};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// A started lobby, its race and the position of the requested question.
struct Play {
    lobby: Lobby,
    race: Race,
    position: usize,
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    let subtype = content_type
        .split(';')
        .next()?
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("image/")?
        .to_string();
    Some(match subtype.as_str() {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "png" => "png",
        "gif" => "gif",
        "webp" => "webp",
        "heic" => "heic",
        "heif" => "heif",
        "bmp" => "bmp",
        _ => "img",
    })
}

impl HuntService {
    async fn play(&self, lobby_id: LobbyId, question_id: QuestionId) -> Result<Play, HuntError> {
        let lobby = self.lobby(lobby_id).await?;
        let race_id = match (lobby.hunt_started, lobby.race_id) {
            (true, Some(race_id)) => race_id,
            _ => return Err(HuntError::RaceNotStarted),
        };
        let race = self.race(race_id).await?;
        if lobby.is_time_up(&race, Utc::now()) {
            return Err(HuntError::TimeUp);
        }
        let position = race
            .question_position(question_id)
            .ok_or(HuntError::QuestionNotInRace)?;
        Ok(Play {
            lobby,
            race,
            position,
        })
    }

    async fn playing_team(&self, lobby: &Lobby, team_code: &str) -> Result<Team, HuntError> {
        let team = self.team_by_code(team_code).await?;
        if !lobby.has_team(team.id) {
            return Err(HuntError::TeamNotInLobby);
        }
        Ok(team)
    }

    async fn progress_or_new(
        &self,
        team: &Team,
        race_id: RaceId,
    ) -> Result<TeamRaceProgress, HuntError> {
        Ok(self
            .progress
            .get_progress(team.id, race_id)
            .await?
            .unwrap_or_else(|| TeamRaceProgress::new(team.id, race_id)))
    }

    pub async fn question_view(
        &self,
        lobby_id: LobbyId,
        question_id: QuestionId,
    ) -> Result<QuestionView, HuntError> {
        let play = self.play(lobby_id, question_id).await?;
        let question = play
            .race
            .public_questions()
            .into_iter()
            .nth(play.position)
            .ok_or(HuntError::QuestionNotInRace)?;
        let seconds_remaining = play
            .lobby
            .time_remaining(&play.race, Utc::now())
            .map(|left| left.num_seconds())
            .unwrap_or_default();

        Ok(QuestionView {
            lobby_id,
            race_id: play.race.id,
            question,
            total_questions: play.race.total_questions(),
            seconds_remaining,
        })
    }

    /// Scores a typed answer. Attempts are counted here, never taken from the client.
    #[instrument(skip(self, answer))]
    pub async fn check_answer(
        &self,
        lobby_id: LobbyId,
        question_id: QuestionId,
        team_code: &str,
        answer: &str,
    ) -> Result<AnswerResult, HuntError> {
        let play = self.play(lobby_id, question_id).await?;
        let team = self.playing_team(&play.lobby, team_code).await?;
        let question = play
            .race
            .question(question_id)
            .ok_or(HuntError::QuestionNotInRace)?;
        let next_question_id = play.race.next_question_after(question_id).map(|q| q.id);

        let (result, progress) = {
            let _guard = self.scoring.lock().await;
            let mut record = self
                .progress
                .get_answer(team.id, question_id)
                .await?
                .unwrap_or_else(|| TeamAnswer::new(team.id, question_id));

            if record.answered_correctly {
                debug!(team_id = %team.id, %question_id, "Question already answered");
                return Ok(AnswerResult {
                    correct: true,
                    already_answered: true,
                    points: record.points_awarded,
                    attempts: record.attempts,
                    next_question_id,
                    race_complete: next_question_id.is_none(),
                });
            }

            record.attempts += 1;
            let correct = question.accepts(answer);
            let mut progress = None;
            if correct {
                let points = scoring::points_for_attempt(question.points, record.attempts);
                record.answered_correctly = true;
                record.points_awarded = points;

                let mut row = self.progress_or_new(&team, play.race.id).await?;
                row.record_correct(question_id, points, play.position);
                self.progress.save_progress(row.clone()).await?;
                progress = Some(row);
            }
            self.progress.save_answer(record.clone()).await?;

            (
                AnswerResult {
                    correct,
                    already_answered: false,
                    points: record.points_awarded,
                    attempts: record.attempts,
                    next_question_id: if correct { next_question_id } else { None },
                    race_complete: correct && next_question_id.is_none(),
                },
                progress,
            )
        };

        if let Some(progress) = progress {
            info!(
                team_id = %team.id,
                %question_id,
                points = result.points,
                attempts = result.attempts,
                "Correct answer"
            );
            self.broadcast(
                Topic::Race(play.race.id),
                HuntEvent::TeamProgress {
                    race_id: play.race.id,
                    progress,
                },
            )
            .await;
            self.publish_leaderboards(Some(play.race.id)).await?;
        }
        Ok(result)
    }

    /// Stores a photo for later review. Completes the question without awarding points.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_photo(
        &self,
        lobby_id: LobbyId,
        question_id: QuestionId,
        team_code: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<PhotoResult, HuntError> {
        let play = self.play(lobby_id, question_id).await?;
        let team = self.playing_team(&play.lobby, team_code).await?;
        if bytes.is_empty() {
            return Err(HuntError::MissingPhoto);
        }
        let extension = content_type
            .and_then(image_extension)
            .ok_or_else(|| HuntError::invalid("Upload must be an image"))?;

        let dir: PathBuf = self
            .upload_dir
            .join(lobby_id.to_string())
            .join(team.id.to_string());
        let path = dir.join(format!("{}.{}", question_id, extension));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HuntError::Storage(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| HuntError::Storage(e.to_string()))?;
        info!(path = %path.display(), "Photo stored");

        let next_question_id = play.race.next_question_after(question_id).map(|q| q.id);
        let progress = {
            let _guard = self.scoring.lock().await;
            let mut record = self
                .progress
                .get_answer(team.id, question_id)
                .await?
                .unwrap_or_else(|| TeamAnswer::new(team.id, question_id));
            record.photo_uploaded = true;
            let answered_correctly = record.answered_correctly;
            self.progress.save_answer(record).await?;

            let mut row = self.progress_or_new(&team, play.race.id).await?;
            if row.record_photo(question_id, play.position, answered_correctly) {
                self.progress.save_progress(row.clone()).await?;
                Some(row)
            } else {
                None
            }
        };

        if let Some(progress) = progress {
            self.broadcast(
                Topic::Race(play.race.id),
                HuntEvent::TeamProgress {
                    race_id: play.race.id,
                    progress,
                },
            )
            .await;
            self.publish_leaderboards(Some(play.race.id)).await?;
        }

        Ok(PhotoResult {
            stored: true,
            pending_review: true,
            next_question_id,
            race_complete: next_question_id.is_none(),
        })
    }

    /// Remembers where a team is in the race, clamped to the number of questions.
    #[instrument(skip(self))]
    pub async fn save_question_index(
        &self,
        team_code: &str,
        race_id: RaceId,
        index: usize,
    ) -> Result<TeamRaceProgress, HuntError> {
        let team = self.team_by_code(team_code).await?;
        let race = self.race(race_id).await?;
        let _guard = self.scoring.lock().await;
        let mut progress = self.progress_or_new(&team, race_id).await?;
        progress.set_question_index(index, race.total_questions());
        self.progress.save_progress(progress.clone()).await?;
        Ok(progress)
    }
}
