//! Notification persistence and realtime fan-out.
//!
//! [`Notifier::notify`] writes the notification row and then, if the
//! recipient has a live connection, pushes the serialized row to their
//! broadcast group. Publishing with no subscriber is a no-op, never an
//! error: the stored row is the source of truth and the realtime push is
//! purely an accelerant.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::{
    api::models::notifications::NotificationResponse,
    db::{
        handlers::{Notifications, Users},
        models::notifications::NotificationCreateDBRequest,
    },
    errors::{Error, Result},
    types::UserId,
};

/// Buffered frames per recipient channel. Slow consumers skip frames rather
/// than backpressure the writer; they can always re-fetch from the list
/// endpoint.
const CHANNEL_CAPACITY: usize = 64;

/// Per-recipient broadcast groups for connected realtime clients.
#[derive(Default)]
pub struct NotificationHub {
    channels: DashMap<UserId, broadcast::Sender<String>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the recipient-scoped group, creating it on first subscribe.
    pub fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<String> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a frame to the recipient's group. Returns how many connections
    /// received it; zero subscribers is a no-op.
    pub fn publish(&self, user_id: UserId, frame: &str) -> usize {
        let delivered = match self.channels.get(&user_id) {
            Some(sender) => sender.send(frame.to_string()).unwrap_or(0),
            None => 0,
        };

        // Drop channels nobody listens to anymore
        if delivered == 0 {
            self.channels.remove_if(&user_id, |_, sender| sender.receiver_count() == 0);
        }

        delivered
    }
}

/// Persists notifications and mirrors them to the hub.
#[derive(Clone)]
pub struct Notifier {
    db: PgPool,
    hub: Arc<NotificationHub>,
}

impl Notifier {
    pub fn new(db: PgPool, hub: Arc<NotificationHub>) -> Self {
        Self { db, hub }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Create a notification row; on success, push it to the recipient's
    /// group if one exists.
    #[tracing::instrument(skip(self, request), fields(verb = %request.verb))]
    pub async fn notify(&self, request: &NotificationCreateDBRequest) -> Result<NotificationResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Notifications::new(&mut conn);
        let row = repo.create(request).await?;

        let response = NotificationResponse::from(row);
        let frame = serde_json::json!({
            "type": "notification",
            "payload": &response,
        })
        .to_string();

        let delivered = self.hub.publish(response.recipient_id, &frame);
        tracing::debug!(recipient = %response.recipient_id, delivered, "Notification stored and published");

        Ok(response)
    }

    /// Fan out one notification per administrator. Used for domain events
    /// that need human attention, like a new waiting-list entry.
    #[tracing::instrument(skip_all, fields(verb = %verb))]
    pub async fn notify_admins(
        &self,
        actor_id: Option<UserId>,
        verb: &str,
        description: &str,
        target_type: Option<&str>,
        target_id: Option<uuid::Uuid>,
    ) -> Result<usize> {
        let admins = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut users = Users::new(&mut conn);
            users.list_admins().await?
        };

        let mut count = 0;
        for admin in &admins {
            let request = NotificationCreateDBRequest {
                recipient_id: admin.id,
                actor_id,
                verb: verb.to_string(),
                description: description.to_string(),
                target_type: target_type.map(|s| s.to_string()),
                target_id,
            };

            // One failed insert shouldn't starve the other admins
            if let Err(e) = self.notify(&request).await {
                tracing::error!(admin = %admin.id, error = %e, "Failed to notify administrator");
            } else {
                count += 1;
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_without_subscriber_is_noop() {
        let hub = NotificationHub::new();
        assert_eq!(hub.publish(Uuid::new_v4(), "frame"), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let hub = NotificationHub::new();
        let user = Uuid::new_v4();

        let mut rx1 = hub.subscribe(user);
        let mut rx2 = hub.subscribe(user);

        assert_eq!(hub.publish(user, "hello"), 2);
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_publish_is_scoped_per_recipient() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut alice_rx = hub.subscribe(alice);
        let _bob_rx = hub.subscribe(bob);

        hub.publish(alice, "for alice");
        assert_eq!(alice_rx.recv().await.unwrap(), "for alice");
        assert_eq!(hub.publish(bob, "for bob"), 1);
    }

    mod integration {
        use super::*;
        use crate::db::handlers::Notifications;
        use sqlx::PgPool;
        use std::sync::Arc;

        #[sqlx::test]
        #[test_log::test]
        async fn test_notify_persists_even_with_no_connection(pool: PgPool) {
            let user = crate::test_utils::create_test_user(&pool).await;
            let notifier = Notifier::new(pool.clone(), Arc::new(NotificationHub::new()));

            let request = NotificationCreateDBRequest {
                recipient_id: user.id,
                actor_id: None,
                verb: "applicant.submitted".to_string(),
                description: "New applicant".to_string(),
                target_type: None,
                target_id: None,
            };

            notifier.notify(&request).await.unwrap();

            let mut conn = pool.acquire().await.unwrap();
            let mut repo = Notifications::new(&mut conn);
            let rows = repo.list_for_recipient(user.id, 0, 10).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert!(!rows[0].is_read);
        }

        #[sqlx::test]
        #[test_log::test]
        async fn test_notify_admins_fans_out_one_row_each(pool: PgPool) {
            let admin_a = crate::test_utils::create_test_admin_user(&pool).await;
            let admin_b = crate::test_utils::create_test_admin_user(&pool).await;
            let member = crate::test_utils::create_test_user(&pool).await;

            let notifier = Notifier::new(pool.clone(), Arc::new(NotificationHub::new()));
            let count = notifier
                .notify_admins(None, "applicant.submitted", "New applicant", Some("applicant"), Some(Uuid::new_v4()))
                .await
                .unwrap();
            assert_eq!(count, 2);

            let mut conn = pool.acquire().await.unwrap();
            let mut repo = Notifications::new(&mut conn);
            assert_eq!(repo.list_for_recipient(admin_a.id, 0, 10).await.unwrap().len(), 1);
            assert_eq!(repo.list_for_recipient(admin_b.id, 0, 10).await.unwrap().len(), 1);
            assert!(repo.list_for_recipient(member.id, 0, 10).await.unwrap().is_empty());
        }
    }
}
