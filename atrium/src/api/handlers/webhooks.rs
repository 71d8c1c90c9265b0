use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::AppState;

/// Processor-signed billing webhook.
///
/// The signature is verified against the shared secret before the payload is
/// parsed; signature or envelope failures are the caller's problem (400).
/// After that the processor only needs an acknowledgement: internal
/// processing failures are logged and swallowed into a 200 so the processor
/// does not redeliver forever.
#[utoipa::path(
    post,
    path = "/webhooks/billing",
    tag = "webhooks",
    responses(
        (status = 200, description = "Event acknowledged (processed or ignored)"),
        (status = 400, description = "Invalid signature or malformed payload"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn billing_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> StatusCode {
    let Some(billing) = state.billing.as_ref() else {
        tracing::warn!("Billing webhook called but no payment processor is configured");
        return StatusCode::NOT_IMPLEMENTED;
    };

    let event = match billing.verify_webhook(&headers, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected billing webhook");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::debug!(?event, "Verified billing webhook event");

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "Failed to acquire connection for webhook processing");
            return StatusCode::OK;
        }
    };

    if let Err(e) = crate::billing::sync::apply_event(&mut conn, &event).await {
        // Internal failures are never surfaced to the processor
        tracing::error!(error = %e, "Failed to apply billing webhook event");
    }

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::webhook::{signature_header, SIGNATURE_HEADER};
    use crate::notify::{NotificationHub, Notifier};
    use sqlx::PgPool;
    use std::sync::Arc;

    fn test_state(pool: PgPool) -> AppState {
        let mut config = crate::test_utils::create_test_config();
        config.billing = Some(crate::config::BillingConfig::Dummy(crate::config::DummyBillingConfig::default()));
        let billing = crate::billing::create_provider(config.billing.as_ref().unwrap());

        AppState::builder()
            .db(pool.clone())
            .config(config)
            .billing(billing)
            .notifier(Notifier::new(pool, Arc::new(NotificationHub::new())))
            .build()
    }

    fn signed_headers(body: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let now = chrono::Utc::now().timestamp();
        headers.insert(SIGNATURE_HEADER, signature_header(now, body, secret).parse().unwrap());
        headers
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalid_signature_rejected_without_writes(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = crate::test_utils::create_test_user(&pool).await;

        let body = serde_json::json!({
            "type": "customer.subscription.created",
            "data": {"object": {
                "id": "sub_forged",
                "customer": "cus_forged",
                "status": "active"
            }}
        })
        .to_string();

        let status = billing_webhook(State(state), signed_headers(&body, "whsec_wrong"), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // No database writes happened
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_signature_rejected(pool: PgPool) {
        let state = test_state(pool);
        let status = billing_webhook(State(state), HeaderMap::new(), "{}".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_valid_event_replayed_twice_upserts_once(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = crate::test_utils::create_test_user(&pool).await;

        {
            let mut conn = pool.acquire().await.unwrap();
            let mut profiles = crate::db::handlers::Profiles::new(&mut conn);
            profiles.create(user.id).await.unwrap();
            profiles.set_billing_customer(user.id, "cus_hook").await.unwrap();
        }

        let body = serde_json::json!({
            "type": "customer.subscription.created",
            "data": {"object": {
                "id": "sub_hook",
                "customer": "cus_hook",
                "status": "active",
                "cancel_at_period_end": false,
                "current_period_end": 1735689600
            }}
        })
        .to_string();

        for _ in 0..2 {
            let status = billing_webhook(
                State(state.clone()),
                signed_headers(&body, "whsec_dummy"),
                body.clone(),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE external_id = 'sub_hook'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let mut conn = pool.acquire().await.unwrap();
        let mut profiles = crate::db::handlers::Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status.as_deref(), Some("active"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_customer_still_acknowledged(pool: PgPool) {
        let state = test_state(pool);

        let body = serde_json::json!({
            "type": "invoice.payment_failed",
            "data": {"object": {"customer": "cus_nobody", "amount_due": 100}}
        })
        .to_string();

        // Internal resolution failure is logged, not surfaced
        let status = billing_webhook(State(state), signed_headers(&body, "whsec_dummy"), body).await;
        assert_eq!(status, StatusCode::OK);
    }
}
