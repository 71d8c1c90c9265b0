//! Database models for users.

use crate::types::{RoleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub role_id: Option<RoleId>,
    pub invited_by: Option<UserId>,
    pub auth_source: String,
    pub password_hash: Option<String>,
}

/// Database request for updating a user
///
/// `None` fields are left untouched. Activation and password changes flow
/// through here so the account mutation surface stays in one place.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<RoleId>,
    pub password_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Database response for a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub role_id: Option<RoleId>,
    pub invited_by: Option<UserId>,
    pub auth_source: String,
    pub password_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserDBResponse {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}
