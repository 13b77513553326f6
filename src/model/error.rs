use super::{LobbyId, QuestionId, RaceId, TeamId, ZoneId};
use thiserror::Error;

/// Errors raised by hunt operations
#[derive(Debug, Error, PartialEq)]
pub enum HuntError {
    #[error("Race not found: {0}")]
    RaceNotFound(RaceId),

    #[error("Zone not found: {0}")]
    ZoneNotFound(ZoneId),

    #[error("Question not found: {0}")]
    QuestionNotFound(QuestionId),

    #[error("Lobby not found: {0}")]
    LobbyNotFound(LobbyId),

    #[error("No lobby with code {0}")]
    LobbyCodeNotFound(String),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("No team with code {0}")]
    TeamCodeNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A team with this name already exists")]
    TeamNameTaken,

    #[error("You are already in this team")]
    AlreadyMember,

    #[error("This lobby is no longer active")]
    LobbyInactive,

    #[error("Race is not active")]
    RaceInactive,

    #[error("No race selected")]
    NoRaceSelected,

    #[error("No questions found in this race")]
    RaceHasNoQuestions,

    #[error("Cannot start hunt without any teams")]
    NoTeams,

    #[error("All teams must have at least one member")]
    EmptyTeam,

    #[error("Race has already started")]
    RaceAlreadyStarted,

    #[error("Race has not started")]
    RaceNotStarted,

    #[error("Time is up!")]
    TimeUp,

    #[error("Team is not part of this lobby")]
    TeamNotInLobby,

    #[error("Question does not belong to this race")]
    QuestionNotInRace,

    #[error("No photo uploaded")]
    MissingPhoto,

    #[error("Could not allocate a unique code")]
    CodeExhausted,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HuntError {
    pub fn invalid(message: impl Into<String>) -> Self {
        HuntError::InvalidInput(message.into())
    }

    /// True for errors caused by an unknown identifier or code
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HuntError::RaceNotFound(_)
                | HuntError::ZoneNotFound(_)
                | HuntError::QuestionNotFound(_)
                | HuntError::LobbyNotFound(_)
                | HuntError::LobbyCodeNotFound(_)
                | HuntError::TeamNotFound(_)
                | HuntError::TeamCodeNotFound(_)
        )
    }
}
