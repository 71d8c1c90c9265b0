//! Database models for the role catalog.

use crate::types::RoleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role code assigned to members provisioned by the admission workflow.
pub const MEMBER_ROLE_CODE: &str = "member";
/// Role code assigned to invited moderation collaborators.
pub const MODERATOR_ROLE_CODE: &str = "moderator";

#[derive(Debug, Clone)]
pub struct RoleCreateDBRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleDBResponse {
    pub id: RoleId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
