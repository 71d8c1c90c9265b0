//! API models for member profiles.

use crate::db::models::profiles::{ProfileDBResponse, ProfileUpdateDBRequest};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub phone_number: Option<String>,
    pub biography: Option<String>,
    pub occupation: Option<String>,
    pub city: Option<String>,
    /// Cached subscription summary; possibly stale between reconciliations
    pub subscription_status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileDBResponse> for ProfileResponse {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            phone_number: db.phone_number,
            biography: db.biography,
            occupation: db.occupation,
            city: db.city,
            subscription_status: db.subscription_status,
            current_period_end: db.current_period_end,
            cancel_at_period_end: db.cancel_at_period_end,
            card_brand: db.card_brand,
            card_last4: db.card_last4,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub phone_number: Option<String>,
    pub biography: Option<String>,
    pub occupation: Option<String>,
    pub city: Option<String>,
}

impl From<ProfileUpdate> for ProfileUpdateDBRequest {
    fn from(api: ProfileUpdate) -> Self {
        Self {
            phone_number: api.phone_number,
            biography: api.biography,
            occupation: api.occupation,
            city: api.city,
        }
    }
}
