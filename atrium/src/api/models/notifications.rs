//! API models for notifications.

use crate::db::models::notifications::NotificationDBResponse;
use crate::types::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: NotificationId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub actor_id: Option<UserId>,
    pub verb: String,
    pub description: String,
    pub target_type: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub target_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            recipient_id: db.recipient_id,
            actor_id: db.actor_id,
            verb: db.verb,
            description: db.description,
            target_type: db.target_type,
            target_id: db.target_id,
            is_read: db.is_read,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub status: String,
    /// Rows flipped by this call (zero on repeat calls)
    pub updated: u64,
}
