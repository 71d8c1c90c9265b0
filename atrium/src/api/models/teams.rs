//! API models for moderation teams.

use crate::db::models::teams::{TeamCreateDBRequest, TeamDBResponse, TeamMemberDBResponse, TeamUpdateDBRequest};
use crate::types::{RoleId, TeamId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeamCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<TeamCreate> for TeamCreateDBRequest {
    fn from(api: TeamCreate) -> Self {
        Self {
            name: api.name,
            description: api.description,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl From<TeamUpdate> for TeamUpdateDBRequest {
    fn from(api: TeamUpdate) -> Self {
        Self {
            name: api.name,
            description: api.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TeamId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Members, included on detail reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<TeamMemberResponse>>,
}

impl From<TeamDBResponse> for TeamResponse {
    fn from(db: TeamDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            created_at: db.created_at,
            members: None,
        }
    }
}

impl TeamResponse {
    pub fn with_members(mut self, members: Vec<TeamMemberResponse>) -> Self {
        self.members = Some(members);
        self
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeamMemberAdd {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub role_id: RoleId,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamMemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub role_code: String,
    pub role_name: String,
    pub joined_at: DateTime<Utc>,
}

impl From<TeamMemberDBResponse> for TeamMemberResponse {
    fn from(db: TeamMemberDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            is_active: db.is_active,
            role_code: db.role_code,
            role_name: db.role_name,
            joined_at: db.joined_at,
        }
    }
}

/// Invite an outside collaborator as a moderator: provisions an inactive
/// account and emails an activation link.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModeratorInvite {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModeratorInviteResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub email: String,
    pub message: String,
}
