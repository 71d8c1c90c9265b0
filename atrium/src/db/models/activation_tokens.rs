//! Database models for account activation tokens.

use crate::auth::password::Argon2Params;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single-use credential that lets a newly approved or invited account set
/// its password. The raw token is only ever held in memory long enough to be
/// emailed; the row stores an Argon2 hash. Consuming a token deletes the row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivationToken {
    pub id: Uuid,
    pub email: String,
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request for creating an activation token
#[derive(Debug, Clone)]
pub struct ActivationTokenCreateRequest {
    pub email: String,
    pub user_id: UserId,
    pub raw_token: String,
    pub expires_at: DateTime<Utc>,
    pub argon2_params: Argon2Params,
}
