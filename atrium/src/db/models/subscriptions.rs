//! Database models for the durable subscription record.

use crate::types::{PlanId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Upsert request keyed on the processor's subscription id. Replays of the
/// same state (e.g. redelivered webhooks) converge on a single row.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsertDBRequest {
    pub external_id: String,
    pub user_id: UserId,
    pub plan_id: Option<PlanId>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// Database response for a durable subscription record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionDBResponse {
    pub id: Uuid,
    pub external_id: String,
    pub user_id: UserId,
    pub plan_id: Option<PlanId>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
