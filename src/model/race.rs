use super::{validation, HuntError, QuestionId, RaceId, Timestamp, ZoneId};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_START_LOCATION: &str = "Default Location";
pub const DEFAULT_TIME_LIMIT_MINUTES: u32 = 60;
pub const DEFAULT_QUESTION_POINTS: u32 = 10;

/// Race aggregate: zones in play order, each holding its questions in play order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: RaceId,
    pub name: String,
    pub description: String,
    pub start_location: String,
    pub time_limit_minutes: u32,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub location: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    /// Accepted answers, `|` separated.
    pub answer: String,
    pub points: u32,
    #[serde(default)]
    pub requires_photo: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRace {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_location: Option<String>,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_location: Option<String>,
    pub time_limit_minutes: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneInput {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    pub zone_id: ZoneId,
    pub text: String,
    pub answer: String,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub requires_photo: bool,
}

/// A question as shown to players: never carries the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub text: String,
    pub points: u32,
    pub requires_photo: bool,
    pub position: usize,
}

impl Race {
    pub fn new(input: NewRace, created_by: &str) -> Result<Self, HuntError> {
        let name = validation::name("name", &input.name)?;
        let start_location = match input.start_location.as_deref() {
            Some(location) if !location.trim().is_empty() => {
                validation::location("start_location", location)?
            }
            _ => DEFAULT_START_LOCATION.to_string(),
        };
        let time_limit_minutes = validation::time_limit(
            input
                .time_limit_minutes
                .unwrap_or(DEFAULT_TIME_LIMIT_MINUTES),
        )?;

        Ok(Race {
            id: Uuid::new_v4(),
            name,
            description: input.description.unwrap_or_default().trim().to_string(),
            start_location,
            time_limit_minutes,
            is_active: true,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            zones: Vec::new(),
        })
    }

    pub fn apply(&mut self, update: RaceUpdate) -> Result<(), HuntError> {
        if let Some(name) = update.name {
            self.name = validation::name("name", &name)?;
        }
        if let Some(description) = update.description {
            self.description = description.trim().to_string();
        }
        if let Some(location) = update.start_location {
            self.start_location = validation::location("start_location", &location)?;
        }
        if let Some(minutes) = update.time_limit_minutes {
            self.time_limit_minutes = validation::time_limit(minutes)?;
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Duration {
        Duration::minutes(i64::from(self.time_limit_minutes))
    }

    pub fn deadline(&self, start: Timestamp) -> Timestamp {
        start + self.time_limit()
    }

    // ===== Zones =====

    pub fn zone(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == zone_id)
    }

    pub fn add_zone(&mut self, input: ZoneInput) -> Result<&Zone, HuntError> {
        let zone = Zone {
            id: Uuid::new_v4(),
            name: validation::name("name", &input.name)?,
            location: input.location.trim().to_string(),
            created_at: Utc::now(),
            questions: Vec::new(),
        };
        self.zones.push(zone);
        Ok(&self.zones[self.zones.len() - 1])
    }

    pub fn update_zone(&mut self, zone_id: ZoneId, input: ZoneInput) -> Result<&Zone, HuntError> {
        let name = validation::name("name", &input.name)?;
        let zone = self
            .zones
            .iter_mut()
            .find(|z| z.id == zone_id)
            .ok_or(HuntError::ZoneNotFound(zone_id))?;
        zone.name = name;
        zone.location = input.location.trim().to_string();
        Ok(zone)
    }

    /// Removes a zone together with its questions.
    pub fn remove_zone(&mut self, zone_id: ZoneId) -> Result<Zone, HuntError> {
        let index = self
            .zones
            .iter()
            .position(|z| z.id == zone_id)
            .ok_or(HuntError::ZoneNotFound(zone_id))?;
        Ok(self.zones.remove(index))
    }

    // ===== Questions =====

    pub fn add_question(&mut self, input: QuestionInput) -> Result<&Question, HuntError> {
        let question = Question {
            id: Uuid::new_v4(),
            text: validation::non_empty("text", &input.text)?,
            answer: validation::non_empty("answer", &input.answer)?,
            points: input.points.unwrap_or(DEFAULT_QUESTION_POINTS),
            requires_photo: input.requires_photo,
            created_at: Utc::now(),
        };
        let zone = self
            .zones
            .iter_mut()
            .find(|z| z.id == input.zone_id)
            .ok_or(HuntError::ZoneNotFound(input.zone_id))?;
        zone.questions.push(question);
        Ok(&zone.questions[zone.questions.len() - 1])
    }

    /// Rewrites a question; a different `zone_id` moves it to the end of that zone.
    pub fn update_question(
        &mut self,
        question_id: QuestionId,
        input: QuestionInput,
    ) -> Result<&Question, HuntError> {
        let text = validation::non_empty("text", &input.text)?;
        let answer = validation::non_empty("answer", &input.answer)?;
        let target = self
            .zones
            .iter()
            .position(|z| z.id == input.zone_id)
            .ok_or(HuntError::ZoneNotFound(input.zone_id))?;
        let (zone_index, question_index) = self
            .locate(question_id)
            .ok_or(HuntError::QuestionNotFound(question_id))?;

        let (zone_index, question_index) = if zone_index == target {
            (zone_index, question_index)
        } else {
            let question = self.zones[zone_index].questions.remove(question_index);
            self.zones[target].questions.push(question);
            (target, self.zones[target].questions.len() - 1)
        };

        let question = &mut self.zones[zone_index].questions[question_index];
        question.text = text;
        question.answer = answer;
        if let Some(points) = input.points {
            question.points = points;
        }
        question.requires_photo = input.requires_photo;
        Ok(question)
    }

    pub fn remove_question(&mut self, question_id: QuestionId) -> Result<Question, HuntError> {
        let (zone_index, question_index) = self
            .locate(question_id)
            .ok_or(HuntError::QuestionNotFound(question_id))?;
        Ok(self.zones[zone_index].questions.remove(question_index))
    }

    fn locate(&self, question_id: QuestionId) -> Option<(usize, usize)> {
        self.zones.iter().enumerate().find_map(|(zone_index, zone)| {
            zone.questions
                .iter()
                .position(|q| q.id == question_id)
                .map(|question_index| (zone_index, question_index))
        })
    }

    // ===== Play order =====

    pub fn ordered_questions(&self) -> impl Iterator<Item = (&Zone, &Question)> {
        self.zones
            .iter()
            .flat_map(|zone| zone.questions.iter().map(move |q| (zone, q)))
    }

    pub fn total_questions(&self) -> usize {
        self.zones.iter().map(|z| z.questions.len()).sum()
    }

    pub fn first_question(&self) -> Option<&Question> {
        self.ordered_questions().map(|(_, q)| q).next()
    }

    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.ordered_questions()
            .map(|(_, q)| q)
            .find(|q| q.id == question_id)
    }

    /// 0-based index of the question in play order.
    pub fn question_position(&self, question_id: QuestionId) -> Option<usize> {
        self.ordered_questions().position(|(_, q)| q.id == question_id)
    }

    /// Next question in play order, crossing zone boundaries.
    pub fn next_question_after(&self, question_id: QuestionId) -> Option<&Question> {
        let position = self.question_position(question_id)?;
        self.ordered_questions().nth(position + 1).map(|(_, q)| q)
    }

    pub fn public_questions(&self) -> Vec<PublicQuestion> {
        self.ordered_questions()
            .enumerate()
            .map(|(position, (zone, question))| PublicQuestion {
                id: question.id,
                zone_id: zone.id,
                zone_name: zone.name.clone(),
                text: question.text.clone(),
                points: question.points,
                requires_photo: question.requires_photo,
                position,
            })
            .collect()
    }
}

impl Question {
    /// Trimmed, case-insensitive match against every accepted alternative.
    pub fn accepts(&self, answer: &str) -> bool {
        let given = answer.trim().to_lowercase();
        if given.is_empty() {
            return false;
        }
        self.answer
            .split('|')
            .map(|alternative| alternative.trim().to_lowercase())
            .any(|alternative| alternative == given)
    }
}
