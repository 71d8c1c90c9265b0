//! Database models for waiting-list applicants and the rejection reason catalog.

use crate::types::{ApplicantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Waiting-list entry status. Transitions only pending -> approved or
/// pending -> rejected; both are terminal. The repositories enforce this
/// with conditional updates, never read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "applicant_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicantStatus {
    Pending,
    Approved,
    Rejected,
}

/// Database request for creating a waiting-list entry
#[derive(Debug, Clone)]
pub struct ApplicantCreateDBRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: Option<String>,
    pub occupation: Option<String>,
    pub referred_by: Option<String>,
    pub survey: Option<serde_json::Value>,
}

/// Database response for a waiting-list entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicantDBResponse {
    pub id: ApplicantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: Option<String>,
    pub occupation: Option<String>,
    pub referred_by: Option<String>,
    pub survey: Option<serde_json::Value>,
    pub status: ApplicantStatus,
    pub rejection_reason_id: Option<Uuid>,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A catalog entry administrators pick from when rejecting an applicant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RejectionReason {
    pub id: Uuid,
    pub code: String,
    pub label: String,
}
