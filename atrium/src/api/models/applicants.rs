//! API models for the waiting list.

use crate::db::models::applicants::{ApplicantCreateDBRequest, ApplicantDBResponse, ApplicantStatus, RejectionReason};
use crate::types::ApplicantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Public submission payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplicantSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: Option<String>,
    pub occupation: Option<String>,
    pub referred_by: Option<String>,
    /// Free-form survey answers, stored verbatim
    #[schema(value_type = Option<Object>)]
    pub survey: Option<serde_json::Value>,
}

impl From<ApplicantSubmission> for ApplicantCreateDBRequest {
    fn from(api: ApplicantSubmission) -> Self {
        Self {
            first_name: api.first_name,
            last_name: api.last_name,
            email: api.email,
            phone_number: api.phone_number,
            city: api.city,
            occupation: api.occupation,
            referred_by: api.referred_by,
            survey: api.survey,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApplicantResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ApplicantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: Option<String>,
    pub occupation: Option<String>,
    pub referred_by: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub survey: Option<serde_json::Value>,
    pub status: ApplicantStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rejection_reason_id: Option<Uuid>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ApplicantDBResponse> for ApplicantResponse {
    fn from(db: ApplicantDBResponse) -> Self {
        Self {
            id: db.id,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            phone_number: db.phone_number,
            city: db.city,
            occupation: db.occupation,
            referred_by: db.referred_by,
            survey: db.survey,
            status: db.status,
            rejection_reason_id: db.rejection_reason_id,
            review_notes: db.review_notes,
            reviewed_at: db.reviewed_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RejectRequest {
    #[schema(value_type = String, format = "uuid")]
    pub reason_id: Uuid,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ExistsQuery {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExistsResponse {
    /// True when an approved entry already exists for the email
    pub exists: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListApplicantsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: super::pagination::Pagination,
    /// Restrict to a single status
    pub status: Option<ApplicantStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RejectionReasonResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub code: String,
    pub label: String,
}

impl From<RejectionReason> for RejectionReasonResponse {
    fn from(db: RejectionReason) -> Self {
        Self {
            id: db.id,
            code: db.code,
            label: db.label,
        }
    }
}
