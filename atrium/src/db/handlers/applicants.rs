//! Database repository for waiting-list applicants.
//!
//! Status transitions are compare-and-swap updates conditioned on
//! `status = 'pending'`, so two concurrent reviewers cannot both win: the
//! second update matches zero rows and surfaces as "already processed".

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::applicants::{ApplicantCreateDBRequest, ApplicantDBResponse, ApplicantStatus, RejectionReason},
};
use crate::types::{abbrev_uuid, ApplicantId, UserId};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing applicants
#[derive(Debug, Clone)]
pub struct ApplicantFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<ApplicantStatus>,
}

impl ApplicantFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            status: None,
        }
    }

    pub fn with_status(mut self, status: ApplicantStatus) -> Self {
        self.status = Some(status);
        self
    }
}

pub struct Applicants<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Applicants<'c> {
    type CreateRequest = ApplicantCreateDBRequest;
    type UpdateRequest = ();
    type Response = ApplicantDBResponse;
    type Id = ApplicantId;
    type Filter = ApplicantFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let applicant = sqlx::query_as::<_, ApplicantDBResponse>(
            r#"
            INSERT INTO applicants (id, first_name, last_name, email, phone_number, city, occupation, referred_by, survey)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.phone_number)
        .bind(&request.city)
        .bind(&request.occupation)
        .bind(&request.referred_by)
        .bind(&request.survey)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(applicant)
    }

    #[instrument(skip(self), fields(applicant_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let applicant = sqlx::query_as::<_, ApplicantDBResponse>("SELECT * FROM applicants WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(applicant)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let applicants = sqlx::query_as::<_, ApplicantDBResponse>("SELECT * FROM applicants WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(applicants.into_iter().map(|a| (a.id, a)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let applicants = sqlx::query_as::<_, ApplicantDBResponse>(
            r#"
            SELECT * FROM applicants
            WHERE ($3::applicant_status IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(filter.limit)
        .bind(filter.skip)
        .bind(filter.status)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(applicants)
    }

    #[instrument(skip(self), fields(applicant_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM applicants WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update(&mut self, _id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Entries are only ever mutated through the status transitions below.
        Err(DbError::Other(anyhow::anyhow!(
            "applicants are mutated via approve/reject transitions only"
        )))
    }
}

impl<'c> Applicants<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Whether an approved entry exists for this email.
    #[instrument(skip(self, email), err)]
    pub async fn approved_exists(&mut self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applicants WHERE email = $1 AND status = 'approved'")
            .bind(email)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count > 0)
    }

    /// Transition pending -> approved. Returns `None` when the entry was not
    /// pending (or does not exist) - the caller reports that as a conflict.
    #[instrument(skip(self), fields(applicant_id = %abbrev_uuid(&id)), err)]
    pub async fn transition_to_approved(&mut self, id: ApplicantId, reviewed_by: UserId) -> Result<Option<ApplicantDBResponse>> {
        let applicant = sqlx::query_as::<_, ApplicantDBResponse>(
            r#"
            UPDATE applicants
            SET status = 'approved', reviewed_by = $2, reviewed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reviewed_by)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(applicant)
    }

    /// Transition pending -> rejected with a catalog reason and free-text notes.
    #[instrument(skip(self, notes), fields(applicant_id = %abbrev_uuid(&id)), err)]
    pub async fn transition_to_rejected(
        &mut self,
        id: ApplicantId,
        reviewed_by: UserId,
        reason_id: Uuid,
        notes: Option<&str>,
    ) -> Result<Option<ApplicantDBResponse>> {
        let applicant = sqlx::query_as::<_, ApplicantDBResponse>(
            r#"
            UPDATE applicants
            SET status = 'rejected', rejection_reason_id = $3, review_notes = $4, reviewed_by = $2, reviewed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reviewed_by)
        .bind(reason_id)
        .bind(notes)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(applicant)
    }

    /// Look up a rejection reason by its catalog id.
    #[instrument(skip(self), err)]
    pub async fn get_rejection_reason(&mut self, reason_id: Uuid) -> Result<Option<RejectionReason>> {
        let reason = sqlx::query_as::<_, RejectionReason>("SELECT id, code, label FROM rejection_reasons WHERE id = $1")
            .bind(reason_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(reason)
    }

    /// Look up a rejection reason by its stable code.
    #[instrument(skip(self), err)]
    pub async fn get_rejection_reason_by_code(&mut self, code: &str) -> Result<Option<RejectionReason>> {
        let reason = sqlx::query_as::<_, RejectionReason>("SELECT id, code, label FROM rejection_reasons WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(reason)
    }

    /// List the rejection reason catalog.
    #[instrument(skip(self), err)]
    pub async fn list_rejection_reasons(&mut self) -> Result<Vec<RejectionReason>> {
        let reasons = sqlx::query_as::<_, RejectionReason>("SELECT id, code, label FROM rejection_reasons ORDER BY code")
            .fetch_all(&mut *self.db)
            .await?;

        Ok(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    fn request(email: &str) -> ApplicantCreateDBRequest {
        ApplicantCreateDBRequest {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: email.to_string(),
            phone_number: "+1-555-0100".to_string(),
            city: Some("Arlington".to_string()),
            occupation: Some("Rear Admiral".to_string()),
            referred_by: None,
            survey: Some(serde_json::json!({"heard_from": "a friend"})),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_submission_starts_pending(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Applicants::new(&mut conn);

        let applicant = repo.create(&request("grace@example.com")).await.unwrap();
        assert_eq!(applicant.status, ApplicantStatus::Pending);
        assert!(applicant.reviewed_at.is_none());
        assert!(!repo.approved_exists("grace@example.com").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_approve_transition_is_single_shot(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Applicants::new(&mut conn);

        let applicant = repo.create(&request("once@example.com")).await.unwrap();

        let approved = repo.transition_to_approved(applicant.id, reviewer.id).await.unwrap();
        assert_eq!(approved.unwrap().status, ApplicantStatus::Approved);
        assert!(repo.approved_exists("once@example.com").await.unwrap());

        // Second transition finds no pending row
        let again = repo.transition_to_approved(applicant.id, reviewer.id).await.unwrap();
        assert!(again.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reject_records_reason_and_notes(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Applicants::new(&mut conn);

        let applicant = repo.create(&request("no@example.com")).await.unwrap();
        let reason = repo.get_rejection_reason_by_code("not_a_fit").await.unwrap().unwrap();

        let rejected = repo
            .transition_to_rejected(applicant.id, reviewer.id, reason.id, Some("spam application"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rejected.status, ApplicantStatus::Rejected);
        assert_eq!(rejected.rejection_reason_id, Some(reason.id));
        assert_eq!(rejected.review_notes.as_deref(), Some("spam application"));

        // Rejected entries cannot be approved afterwards
        let approved = repo.transition_to_approved(applicant.id, reviewer.id).await.unwrap();
        assert!(approved.is_none());
        assert!(!repo.approved_exists("no@example.com").await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_by_status(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Applicants::new(&mut conn);

        let a = repo.create(&request("a@example.com")).await.unwrap();
        let _b = repo.create(&request("b@example.com")).await.unwrap();
        repo.transition_to_approved(a.id, reviewer.id).await.unwrap();

        let pending = repo
            .list(&ApplicantFilter::new(0, 100).with_status(ApplicantStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "b@example.com");
    }
}
