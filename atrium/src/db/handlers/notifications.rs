//! Database repository for notifications.
//!
//! The stored row is the source of truth for read state; the realtime
//! channel only mirrors what gets written here.

use crate::db::{
    errors::Result,
    models::notifications::{NotificationCreateDBRequest, NotificationDBResponse},
};
use crate::types::{abbrev_uuid, NotificationId, UserId};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(recipient = %abbrev_uuid(&request.recipient_id), verb = %request.verb), err)]
    pub async fn create(&mut self, request: &NotificationCreateDBRequest) -> Result<NotificationDBResponse> {
        let notification = sqlx::query_as::<_, NotificationDBResponse>(
            r#"
            INSERT INTO notifications (id, recipient_id, actor_id, verb, description, target_type, target_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.recipient_id)
        .bind(request.actor_id)
        .bind(&request.verb)
        .bind(&request.description)
        .bind(&request.target_type)
        .bind(request.target_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(notification)
    }

    /// A recipient's notifications, newest first.
    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn list_for_recipient(&mut self, recipient_id: UserId, skip: i64, limit: i64) -> Result<Vec<NotificationDBResponse>> {
        let notifications = sqlx::query_as::<_, NotificationDBResponse>(
            "SELECT * FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(recipient_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(notifications)
    }

    /// Mark one notification read. Scoped to the recipient so users cannot
    /// flip rows that aren't theirs.
    #[instrument(skip(self), fields(notification = %abbrev_uuid(&id)), err)]
    pub async fn mark_read(&mut self, id: NotificationId, recipient_id: UserId) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark every unread notification read. Returns the number flipped;
    /// calling again is a no-op.
    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn mark_all_read(&mut self, recipient_id: UserId) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE")
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(recipient = %abbrev_uuid(&recipient_id)), err)]
    pub async fn unread_count(&mut self, recipient_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE")
            .bind(recipient_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn request(recipient_id: UserId) -> NotificationCreateDBRequest {
        NotificationCreateDBRequest {
            recipient_id,
            actor_id: None,
            verb: "applicant.submitted".to_string(),
            description: "A new applicant joined the waiting list".to_string(),
            target_type: Some("applicant".to_string()),
            target_id: Some(Uuid::new_v4()),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_all_read_is_idempotent(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Notifications::new(&mut conn);

        repo.create(&request(user.id)).await.unwrap();
        repo.create(&request(user.id)).await.unwrap();
        assert_eq!(repo.unread_count(user.id).await.unwrap(), 2);

        let flipped = repo.mark_all_read(user.id).await.unwrap();
        assert_eq!(flipped, 2);
        assert_eq!(repo.unread_count(user.id).await.unwrap(), 0);

        // Second call is a no-op
        assert_eq!(repo.mark_all_read(user.id).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_read_is_scoped_to_recipient(pool: PgPool) {
        let owner = crate::test_utils::create_test_user(&pool).await;
        let other = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Notifications::new(&mut conn);

        let notification = repo.create(&request(owner.id)).await.unwrap();

        assert!(!repo.mark_read(notification.id, other.id).await.unwrap());
        assert!(repo.mark_read(notification.id, owner.id).await.unwrap());
    }
}
