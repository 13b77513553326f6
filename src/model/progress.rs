use super::{QuestionId, RaceId, TeamId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Running score and position of one team in one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRaceProgress {
    pub team_id: TeamId,
    pub race_id: RaceId,
    pub score: u32,
    /// Index, in play order, of the question the team is working on.
    pub current_question_index: usize,
    pub questions_answered: u32,
    #[serde(default)]
    pub photo_questions_completed: Vec<QuestionId>,
    pub last_update: Timestamp,
}

impl TeamRaceProgress {
    pub fn new(team_id: TeamId, race_id: RaceId) -> Self {
        TeamRaceProgress {
            team_id,
            race_id,
            score: 0,
            current_question_index: 0,
            questions_answered: 0,
            photo_questions_completed: Vec::new(),
            last_update: Utc::now(),
        }
    }

    /// Adds the points. A question already completed by photo is not counted twice.
    pub fn record_correct(&mut self, question_id: QuestionId, points: u32, position: usize) {
        self.score += points;
        if !self.photo_questions_completed.contains(&question_id) {
            self.questions_answered += 1;
        }
        self.advance_past(position);
    }

    /// Returns false when the photo question was already recorded.
    /// `answered_correctly` means the typed answer already counted the question.
    pub fn record_photo(
        &mut self,
        question_id: QuestionId,
        position: usize,
        answered_correctly: bool,
    ) -> bool {
        if self.photo_questions_completed.contains(&question_id) {
            return false;
        }
        self.photo_questions_completed.push(question_id);
        if !answered_correctly {
            self.questions_answered += 1;
        }
        self.advance_past(position);
        true
    }

    pub fn set_question_index(&mut self, index: usize, total_questions: usize) {
        self.current_question_index = index.min(total_questions);
        self.last_update = Utc::now();
    }

    fn advance_past(&mut self, position: usize) {
        self.current_question_index = self.current_question_index.max(position + 1);
        self.last_update = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAnswer {
    pub team_id: TeamId,
    pub question_id: QuestionId,
    pub attempts: u32,
    pub answered_correctly: bool,
    pub points_awarded: u32,
    pub photo_uploaded: bool,
}

impl TeamAnswer {
    pub fn new(team_id: TeamId, question_id: QuestionId) -> Self {
        TeamAnswer {
            team_id,
            question_id,
            attempts: 0,
            answered_correctly: false,
            points_awarded: 0,
            photo_uploaded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn correct_answer_moves_past_the_question() {
        let mut progress = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());

        progress.record_correct(Uuid::new_v4(), 10, 0);
        progress.record_correct(Uuid::new_v4(), 7, 2);

        assert_eq!(progress.score, 17);
        assert_eq!(progress.questions_answered, 2);
        assert_eq!(progress.current_question_index, 3);
    }

    #[test]
    fn answering_an_earlier_question_does_not_rewind() {
        let mut progress = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());
        progress.set_question_index(4, 5);

        progress.record_correct(Uuid::new_v4(), 10, 1);

        assert_eq!(progress.current_question_index, 4);
    }

    #[test]
    fn photo_is_counted_once() {
        let mut progress = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());
        let question = Uuid::new_v4();

        assert!(progress.record_photo(question, 0, false));
        assert!(!progress.record_photo(question, 0, false));
        assert_eq!(progress.score, 0);
        assert_eq!(progress.questions_answered, 1);
    }

    #[test]
    fn answer_and_photo_complete_a_question_once() {
        let mut answered_first = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());
        let question = Uuid::new_v4();
        answered_first.record_correct(question, 10, 0);
        assert!(answered_first.record_photo(question, 0, true));
        assert_eq!(answered_first.questions_answered, 1);
        assert_eq!(answered_first.score, 10);

        let mut photo_first = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(photo_first.record_photo(question, 0, false));
        photo_first.record_correct(question, 10, 0);
        assert_eq!(photo_first.questions_answered, 1);
        assert_eq!(photo_first.score, 10);
    }

    #[test]
    fn question_index_is_clamped() {
        let mut progress = TeamRaceProgress::new(Uuid::new_v4(), Uuid::new_v4());
        progress.set_question_index(99, 5);
        assert_eq!(progress.current_question_index, 5);
    }
}
