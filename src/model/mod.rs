pub mod code;
mod error;
mod event;
pub mod leaderboard;
mod lobby;
mod progress;
mod race;
pub mod scoring;
mod team;
pub mod validation;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type RaceId = Uuid;
pub type ZoneId = Uuid;
pub type QuestionId = Uuid;
pub type LobbyId = Uuid;
pub type TeamId = Uuid;
pub type MemberId = Uuid;
pub type ClientId = Uuid;

pub type Timestamp = DateTime<Utc>;

pub use error::HuntError;
pub use event::{
    AnswerResult, ClientRequest, HuntEvent, HuntStatus, LobbyAction, MemberSummary, RaceStatus,
    TeamSummary, Topic,
};
pub use leaderboard::LeaderboardEntry;
pub use lobby::Lobby;
pub use progress::{TeamAnswer, TeamRaceProgress};
pub use race::{
    NewRace, PublicQuestion, Question, QuestionInput, Race, RaceUpdate, Zone, ZoneInput,
    DEFAULT_QUESTION_POINTS, DEFAULT_START_LOCATION, DEFAULT_TIME_LIMIT_MINUTES,
};
pub use team::{Team, TeamMember};
