//! Database repository for the durable subscription record.
//!
//! Keyed by the processor's subscription id, independent of the per-profile
//! cache. Upserts make webhook replays and reconciliation idempotent: the
//! same external id always converges to one row.

use crate::db::{
    errors::Result,
    models::subscriptions::{SubscriptionDBResponse, SubscriptionUpsertDBRequest},
};
use crate::types::{abbrev_uuid, UserId};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Subscriptions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Subscriptions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create-or-update keyed on the external subscription id.
    #[instrument(skip(self, request), fields(external_id = %request.external_id), err)]
    pub async fn upsert(&mut self, request: &SubscriptionUpsertDBRequest) -> Result<SubscriptionDBResponse> {
        let record = sqlx::query_as::<_, SubscriptionDBResponse>(
            r#"
            INSERT INTO subscriptions (id, external_id, user_id, plan_id, status, current_period_end, cancel_at_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO UPDATE SET
                plan_id = COALESCE(EXCLUDED.plan_id, subscriptions.plan_id),
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.external_id)
        .bind(request.user_id)
        .bind(request.plan_id)
        .bind(&request.status)
        .bind(request.current_period_end)
        .bind(request.cancel_at_period_end)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self, external_id), err)]
    pub async fn get_by_external_id(&mut self, external_id: &str) -> Result<Option<SubscriptionDBResponse>> {
        let record = sqlx::query_as::<_, SubscriptionDBResponse>("SELECT * FROM subscriptions WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(record)
    }

    /// Full history for a user, newest first.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<SubscriptionDBResponse>> {
        let records = sqlx::query_as::<_, SubscriptionDBResponse>(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(records)
    }

    /// Mirror a cancellation flag without touching the rest of the record.
    #[instrument(skip(self, external_id), err)]
    pub async fn set_cancel_at_period_end(&mut self, external_id: &str, cancel: bool) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET cancel_at_period_end = $2, updated_at = NOW() WHERE external_id = $1")
            .bind(external_id)
            .bind(cancel)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn request(user_id: UserId, external_id: &str, status: &str) -> SubscriptionUpsertDBRequest {
        SubscriptionUpsertDBRequest {
            external_id: external_id.to_string(),
            user_id,
            plan_id: None,
            status: status.to_string(),
            current_period_end: chrono::DateTime::from_timestamp(1735689600, 0),
            cancel_at_period_end: false,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upsert_is_idempotent_on_external_id(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Subscriptions::new(&mut conn);

        let first = repo.upsert(&request(user.id, "sub_replay", "active")).await.unwrap();
        // Replaying the identical payload twice produces one record, not two
        let second = repo.upsert(&request(user.id, "sub_replay", "active")).await.unwrap();
        assert_eq!(first.id, second.id);

        let history = repo.list_for_user(user.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_upsert_updates_status_in_place(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Subscriptions::new(&mut conn);

        repo.upsert(&request(user.id, "sub_status", "active")).await.unwrap();
        let updated = repo.upsert(&request(user.id, "sub_status", "past_due")).await.unwrap();

        assert_eq!(updated.status, "past_due");
        let fetched = repo.get_by_external_id("sub_status").await.unwrap().unwrap();
        assert_eq!(fetched.status, "past_due");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cancel_flag_mirroring(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Subscriptions::new(&mut conn);

        repo.upsert(&request(user.id, "sub_cancel", "active")).await.unwrap();
        repo.set_cancel_at_period_end("sub_cancel", true).await.unwrap();

        let record = repo.get_by_external_id("sub_cancel").await.unwrap().unwrap();
        assert!(record.cancel_at_period_end);
    }
}
