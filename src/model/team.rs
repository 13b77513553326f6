use super::{validation, HuntError, MemberId, TeamId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub code: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: MemberId,
    pub name: String,
    pub joined_at: Timestamp,
}

impl Team {
    pub fn new(name: &str, code: String) -> Result<Self, HuntError> {
        Ok(Team {
            id: Uuid::new_v4(),
            name: validation::name("team_name", name)?,
            code,
            created_at: Utc::now(),
            members: Vec::new(),
        })
    }

    pub fn has_member(&self, name: &str) -> bool {
        let name = name.trim();
        self.members.iter().any(|m| m.name == name)
    }

    /// Adds a player; the same display name may appear only once per team.
    pub fn add_member(&mut self, name: &str) -> Result<&TeamMember, HuntError> {
        let name = validation::name("player_name", name)?;
        if self.has_member(&name) {
            return Err(HuntError::AlreadyMember);
        }
        self.members.push(TeamMember {
            id: Uuid::new_v4(),
            name,
            joined_at: Utc::now(),
        });
        Ok(&self.members[self.members.len() - 1])
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    pub fn same_name(&self, other: &str) -> bool {
        Self::name_key(&self.name) == Self::name_key(other)
    }

    /// Case-folded name that team-name uniqueness is checked on.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}
