//! Database models for notifications.

use crate::types::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database request for creating a notification
#[derive(Debug, Clone)]
pub struct NotificationCreateDBRequest {
    pub recipient_id: UserId,
    pub actor_id: Option<UserId>,
    pub verb: String,
    pub description: String,
    /// Polymorphic target reference: a type tag plus the row id it points at
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
}

/// Database response for a notification.
///
/// Rows are immutable after creation except for the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationDBResponse {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub actor_id: Option<UserId>,
    pub verb: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
