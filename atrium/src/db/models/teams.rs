//! Database models for moderation teams and their memberships.

use crate::types::{RoleId, TeamId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TeamCreateDBRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct TeamUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamDBResponse {
    pub id: TeamId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TeamMembershipCreateDBRequest {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role_id: RoleId,
}

/// A team member joined with account and role details, as listed to admins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamMemberDBResponse {
    pub id: Uuid,
    pub team_id: TeamId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub role_code: String,
    pub role_name: String,
    pub joined_at: DateTime<Utc>,
}
