//! Database models for member profiles and the subscription cache.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database response for a profile row.
///
/// The `billing_*`, `subscription_status`, `current_period_end`,
/// `cancel_at_period_end` and `card_*` columns are a locally cached copy of
/// processor-held state. They may be stale between reconciliations; the
/// processor is always the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileDBResponse {
    pub user_id: UserId,
    pub phone_number: Option<String>,
    pub biography: Option<String>,
    pub occupation: Option<String>,
    pub city: Option<String>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub billing_payment_method_id: Option<String>,
    pub subscription_status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for updating the user-editable profile fields
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateDBRequest {
    pub phone_number: Option<String>,
    pub biography: Option<String>,
    pub occupation: Option<String>,
    pub city: Option<String>,
}
