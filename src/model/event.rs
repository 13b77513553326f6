use super::{
    ClientId, LeaderboardEntry, LobbyId, QuestionId, RaceId, Team, TeamId, TeamRaceProgress,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast channel a live connection is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Lobby(LobbyId),
    Race(RaceId),
    Team(TeamId),
    Leaderboard,
    AvailableTeams,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Lobby(id) => write!(f, "lobby/{}", id),
            Topic::Race(id) => write!(f, "race/{}", id),
            Topic::Team(id) => write!(f, "team/{}", id),
            Topic::Leaderboard => write!(f, "leaderboard"),
            Topic::AvailableTeams => write!(f, "available-teams"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub id: TeamId,
    pub name: String,
    pub code: String,
    pub members_count: usize,
    pub members: Vec<MemberSummary>,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        TeamSummary {
            id: team.id,
            name: team.name.clone(),
            code: team.code.clone(),
            members_count: team.members.len(),
            members: team
                .members
                .iter()
                .map(|m| MemberSummary {
                    name: m.name.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceStatus {
    pub race_id: RaceId,
    pub is_active: bool,
    pub started: bool,
    pub start_time: Option<Timestamp>,
}

/// Lobby state for the polling fallback of the start broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntStatus {
    pub lobby_id: LobbyId,
    pub is_active: bool,
    pub hunt_started: bool,
    pub race_id: Option<RaceId>,
    pub first_question_id: Option<QuestionId>,
    pub start_time: Option<Timestamp>,
    pub seconds_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub correct: bool,
    pub already_answered: bool,
    pub points: u32,
    pub attempts: u32,
    pub next_question_id: Option<QuestionId>,
    pub race_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyAction {
    LobbyToggled,
    LobbyDeleted,
    TeamDeleted,
}

/// Server to client push messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HuntEvent {
    ConnectionEstablished {
        client_id: ClientId,
        topic: String,
    },
    TeamJoined {
        lobby_id: LobbyId,
        team: TeamSummary,
    },
    TeamLeft {
        lobby_id: LobbyId,
        team_id: TeamId,
    },
    TeamMemberJoined {
        team_id: TeamId,
        team_name: String,
        member: MemberSummary,
    },
    TeamMembers {
        team_id: TeamId,
        members: Vec<String>,
    },
    LobbyTeams {
        lobby_id: LobbyId,
        teams: Vec<TeamSummary>,
    },
    AvailableTeams {
        teams: Vec<TeamSummary>,
    },
    RaceStatusChanged {
        lobby_id: LobbyId,
        status: String,
        race_id: Option<RaceId>,
    },
    RaceStarted {
        lobby_id: LobbyId,
        race_id: RaceId,
        redirect_url: String,
        first_question_id: Option<QuestionId>,
        start_time: Timestamp,
    },
    LobbyUpdate {
        lobby_id: LobbyId,
        action: LobbyAction,
        is_active: bool,
        team_id: Option<TeamId>,
    },
    TeamProgress {
        race_id: RaceId,
        progress: TeamRaceProgress,
    },
    LeaderboardUpdate {
        race_id: Option<RaceId>,
        entries: Vec<LeaderboardEntry>,
    },
    RaceStatus {
        #[serde(flatten)]
        status: RaceStatus,
    },
    LobbyStatus {
        #[serde(flatten)]
        status: HuntStatus,
    },
    Pong,
    Error {
        message: String,
    },
}

impl HuntEvent {
    pub fn error(message: impl Into<String>) -> Self {
        HuntEvent::Error {
            message: message.into(),
        }
    }
}

/// Client to server requests over a live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    Join {
        #[serde(default)]
        team_code: Option<String>,
    },
    GetData,
    CheckStatus,
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(HuntEvent::Pong).unwrap();
        assert_eq!(json["type"], "pong");

        let team_id = Uuid::new_v4();
        let json = serde_json::to_value(HuntEvent::TeamLeft {
            lobby_id: Uuid::new_v4(),
            team_id,
        })
        .unwrap();
        assert_eq!(json["type"], "team_left");
        assert_eq!(json["team_id"], team_id.to_string());
    }

    #[test]
    fn race_status_is_flattened() {
        let race_id = Uuid::new_v4();
        let json = serde_json::to_value(HuntEvent::RaceStatus {
            status: RaceStatus {
                race_id,
                is_active: true,
                started: false,
                start_time: None,
            },
        })
        .unwrap();
        assert_eq!(json["type"], "race_status");
        assert_eq!(json["race_id"], race_id.to_string());
        assert_eq!(json["started"], false);
    }

    #[test]
    fn parses_client_requests() {
        let ping: ClientRequest = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(ping, ClientRequest::Ping);

        let join: ClientRequest =
            serde_json::from_str(r#"{"action":"join","team_code":"ABC123"}"#).unwrap();
        assert_eq!(
            join,
            ClientRequest::Join {
                team_code: Some("ABC123".to_string())
            }
        );

        assert!(serde_json::from_str::<ClientRequest>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn topics_render_as_paths() {
        let id = Uuid::new_v4();
        assert_eq!(Topic::Lobby(id).to_string(), format!("lobby/{}", id));
        assert_eq!(Topic::AvailableTeams.to_string(), "available-teams");
    }
}
