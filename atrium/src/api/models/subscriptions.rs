//! API models for subscriptions.

use crate::db::models::subscriptions::SubscriptionDBResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubscriptionCreateRequest {
    /// Payment method reference from the client-side tokenization flow
    pub payment_method_id: String,
    /// Processor price the subscription bills against
    pub price_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionCreateResponse {
    pub subscription_id: String,
    pub status: String,
    /// Present when the initial payment still needs client-side confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct SubscriptionStatusQuery {
    /// When true, reconcile against the processor before answering
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionStatusResponse {
    pub status: Option<String>,
    pub subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    /// Whether the answer was freshly reconciled with the processor
    pub refreshed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionCancelResponse {
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<DateTime<Utc>>,
    pub message: String,
}

/// One row of the durable subscription history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionRecordResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub external_id: String,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub plan_id: Option<Uuid>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SubscriptionDBResponse> for SubscriptionRecordResponse {
    fn from(db: SubscriptionDBResponse) -> Self {
        Self {
            id: db.id,
            external_id: db.external_id,
            plan_id: db.plan_id,
            status: db.status,
            current_period_end: db.current_period_end,
            cancel_at_period_end: db.cancel_at_period_end,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
