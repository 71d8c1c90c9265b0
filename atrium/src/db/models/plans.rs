//! Database models for membership plans.

use crate::types::PlanId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database request for creating a plan.
///
/// `amount_minor` is the price in the processor's integer minor units
/// (cents). Monetary values are never floats anywhere in the system.
#[derive(Debug, Clone)]
pub struct PlanCreateDBRequest {
    pub title: String,
    pub description: Option<String>,
    pub price_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub billing_interval: Option<String>,
    pub features: Option<serde_json::Value>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlanUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount_minor: Option<i64>,
    pub billing_interval: Option<String>,
    pub features: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanDBResponse {
    pub id: PlanId,
    pub title: String,
    pub description: Option<String>,
    pub price_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub billing_interval: Option<String>,
    pub features: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
