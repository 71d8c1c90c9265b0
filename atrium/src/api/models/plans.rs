//! API models for membership plans.

use crate::db::models::plans::{PlanCreateDBRequest, PlanDBResponse, PlanUpdateDBRequest};
use crate::types::PlanId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlanCreate {
    pub title: String,
    pub description: Option<String>,
    /// Processor price identifier this plan bills against
    pub price_id: String,
    /// Price in integer minor units (cents)
    pub amount_minor: i64,
    #[serde(default = "PlanCreate::default_currency")]
    pub currency: String,
    pub billing_interval: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub features: Option<serde_json::Value>,
    #[serde(default = "PlanCreate::default_active")]
    pub is_active: bool,
}

impl PlanCreate {
    fn default_currency() -> String {
        "usd".to_string()
    }

    fn default_active() -> bool {
        true
    }
}

impl From<PlanCreate> for PlanCreateDBRequest {
    fn from(api: PlanCreate) -> Self {
        Self {
            title: api.title,
            description: api.description,
            price_id: api.price_id,
            amount_minor: api.amount_minor,
            currency: api.currency,
            billing_interval: api.billing_interval,
            features: api.features,
            is_active: api.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlanUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount_minor: Option<i64>,
    pub billing_interval: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub features: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

impl From<PlanUpdate> for PlanUpdateDBRequest {
    fn from(api: PlanUpdate) -> Self {
        Self {
            title: api.title,
            description: api.description,
            amount_minor: api.amount_minor,
            billing_interval: api.billing_interval,
            features: api.features,
            is_active: api.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PlanId,
    pub title: String,
    pub description: Option<String>,
    pub price_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub billing_interval: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub features: Option<serde_json::Value>,
    pub is_active: bool,
}

impl From<PlanDBResponse> for PlanResponse {
    fn from(db: PlanDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            price_id: db.price_id,
            amount_minor: db.amount_minor,
            currency: db.currency,
            billing_interval: db.billing_interval,
            features: db.features,
            is_active: db.is_active,
        }
    }
}
