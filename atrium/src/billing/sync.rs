//! Subscription state synchronization.
//!
//! The processor holds the authoritative subscription state; locally there
//! are two copies: the per-profile cache (fast reads on the profile page)
//! and the durable `subscriptions` record (history, webhook resolution
//! fallback). [`apply_subscription_state`] writes both. Three paths funnel
//! into it: direct API actions (create/cancel), webhook deliveries, and
//! lazy reconciliation on status reads.

use sqlx::PgConnection;

use crate::{
    billing::{webhook::BillingEvent, BillingProvider, SubscriptionState, SubscriptionStatus},
    db::handlers::{Plans, Profiles, Subscriptions},
    db::models::subscriptions::SubscriptionUpsertDBRequest,
    errors::{Error, Result},
    types::{abbrev_uuid, UserId},
};

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Cache already matched the processor; no writes performed
    Converged,
    /// Cache disagreed with the processor and was overwritten
    Refreshed,
    /// The subscription no longer exists upstream; cache cleared to canceled
    ClearedUpstreamGone,
    /// The user has no cached subscription to reconcile
    NothingToReconcile,
}

/// Write processor state into both local copies: upsert the durable record
/// (keyed on the external id) and overwrite the profile cache.
#[tracing::instrument(skip(conn, state), fields(user_id = %abbrev_uuid(&user_id), subscription = %state.id))]
pub async fn apply_subscription_state(conn: &mut PgConnection, user_id: UserId, state: &SubscriptionState) -> Result<()> {
    let plan_id = match &state.price_id {
        Some(price_id) => {
            let mut plans = Plans::new(&mut *conn);
            plans.get_by_price_id(price_id).await?.map(|p| p.id)
        }
        None => None,
    };

    {
        let mut subscriptions = Subscriptions::new(&mut *conn);
        subscriptions
            .upsert(&SubscriptionUpsertDBRequest {
                external_id: state.id.clone(),
                user_id,
                plan_id,
                status: state.status.as_str().to_string(),
                current_period_end: state.current_period_end,
                cancel_at_period_end: state.cancel_at_period_end,
            })
            .await?;
    }

    let mut profiles = Profiles::new(&mut *conn);
    profiles.apply_subscription_cache(user_id, state).await?;

    Ok(())
}

/// Clear local state for a subscription the processor no longer knows.
#[tracing::instrument(skip(conn), fields(user_id = %abbrev_uuid(&user_id), subscription = %external_id))]
pub async fn clear_subscription_state(conn: &mut PgConnection, user_id: UserId, external_id: &str) -> Result<()> {
    {
        let mut subscriptions = Subscriptions::new(&mut *conn);
        subscriptions
            .upsert(&SubscriptionUpsertDBRequest {
                external_id: external_id.to_string(),
                user_id,
                plan_id: None,
                status: SubscriptionStatus::Canceled.as_str().to_string(),
                current_period_end: None,
                cancel_at_period_end: false,
            })
            .await?;
    }

    let mut profiles = Profiles::new(&mut *conn);
    profiles.clear_subscription_cache(user_id).await?;

    Ok(())
}

/// Compare the cached fields against the processor's view and overwrite on
/// any mismatch. This is the only place sync is actually verified; it runs
/// lazily when a status read asks for fresh data, not continuously.
///
/// Idempotent: a second call with no intervening external change performs no
/// writes.
#[tracing::instrument(skip(conn, provider), fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn reconcile(conn: &mut PgConnection, provider: &dyn BillingProvider, user_id: UserId) -> Result<ReconcileOutcome> {
    let profile = {
        let mut profiles = Profiles::new(&mut *conn);
        profiles.get_by_user(user_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Profile".to_string(),
            detail: user_id.to_string(),
        })?
    };

    let Some(subscription_id) = profile.billing_subscription_id.clone() else {
        return Ok(ReconcileOutcome::NothingToReconcile);
    };

    match provider.retrieve_subscription(&subscription_id).await? {
        None => {
            // Deleted upstream: an explicit canceled state beats stale data
            clear_subscription_state(conn, user_id, &subscription_id).await?;
            Ok(ReconcileOutcome::ClearedUpstreamGone)
        }
        Some(state) => {
            let converged = profile.billing_subscription_id.as_deref() == Some(state.id.as_str())
                && profile.subscription_status.as_deref() == Some(state.status.as_str())
                && profile.current_period_end == state.current_period_end
                && profile.cancel_at_period_end == state.cancel_at_period_end;

            if converged {
                return Ok(ReconcileOutcome::Converged);
            }

            apply_subscription_state(conn, user_id, &state).await?;
            Ok(ReconcileOutcome::Refreshed)
        }
    }
}

/// Apply a verified webhook event. Same effect as [`reconcile`], but pushed
/// by the processor rather than pulled.
///
/// The owning user is resolved by processor customer id, falling back to the
/// durable record keyed by the external subscription id.
#[tracing::instrument(skip_all)]
pub async fn apply_event(conn: &mut PgConnection, event: &BillingEvent) -> Result<()> {
    match event {
        BillingEvent::SubscriptionCreated(state) | BillingEvent::SubscriptionUpdated(state) => {
            let user_id = resolve_user(conn, &state.customer_id, Some(&state.id)).await?;
            apply_subscription_state(conn, user_id, state).await
        }
        BillingEvent::SubscriptionDeleted(state) => {
            let user_id = resolve_user(conn, &state.customer_id, Some(&state.id)).await?;
            clear_subscription_state(conn, user_id, &state.id).await
        }
        BillingEvent::InvoicePaymentSucceeded(invoice) => {
            let user_id = resolve_user(conn, &invoice.customer_id, invoice.subscription_id.as_deref()).await?;
            let mut profiles = Profiles::new(&mut *conn);
            profiles
                .set_subscription_status(user_id, SubscriptionStatus::Active.as_str())
                .await?;
            Ok(())
        }
        BillingEvent::InvoicePaymentFailed(invoice) => {
            let user_id = resolve_user(conn, &invoice.customer_id, invoice.subscription_id.as_deref()).await?;
            let mut profiles = Profiles::new(&mut *conn);
            profiles
                .set_subscription_status(user_id, SubscriptionStatus::PastDue.as_str())
                .await?;
            Ok(())
        }
        BillingEvent::Ignored { event_type } => {
            tracing::debug!(event_type, "Ignoring webhook event type");
            Ok(())
        }
    }
}

async fn resolve_user(conn: &mut PgConnection, customer_id: &str, subscription_id: Option<&str>) -> Result<UserId> {
    {
        let mut profiles = Profiles::new(&mut *conn);
        if let Some(profile) = profiles.get_by_billing_customer(customer_id).await? {
            return Ok(profile.user_id);
        }
    }

    if let Some(subscription_id) = subscription_id {
        let mut subscriptions = Subscriptions::new(&mut *conn);
        if let Some(record) = subscriptions.get_by_external_id(subscription_id).await? {
            return Ok(record.user_id);
        }
    }

    Err(Error::NotFound {
        resource: "Billing customer".to_string(),
        detail: customer_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::dummy::DummyGateway;
    use crate::billing::webhook::InvoiceEvent;
    use crate::config::DummyBillingConfig;
    use crate::db::handlers::Subscriptions;
    use sqlx::PgPool;

    fn gateway() -> DummyGateway {
        DummyGateway::from_config(&DummyBillingConfig::default())
    }

    async fn subscribed_user(pool: &PgPool, gw: &DummyGateway) -> (UserId, SubscriptionState) {
        let user = crate::test_utils::create_test_user(pool).await;
        let customer = gw.create_customer(&user.email, "Test", "pm_1").await.unwrap();
        let state = gw.create_subscription(&customer, "price_1").await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        {
            let mut profiles = Profiles::new(&mut conn);
            profiles.set_billing_customer(user.id, &customer).await.unwrap();
        }
        apply_subscription_state(&mut conn, user.id, &state).await.unwrap();
        (user.id, state)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reconcile_is_idempotent(pool: PgPool) {
        let gw = gateway();
        let (user_id, _state) = subscribed_user(&pool, &gw).await;

        let mut conn = pool.acquire().await.unwrap();
        // Already in sync: first reconcile converges without writes
        assert_eq!(reconcile(&mut conn, &gw, user_id).await.unwrap(), ReconcileOutcome::Converged);
        assert_eq!(reconcile(&mut conn, &gw, user_id).await.unwrap(), ReconcileOutcome::Converged);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reconcile_overwrites_drifted_cache(pool: PgPool) {
        let gw = gateway();
        let (user_id, state) = subscribed_user(&pool, &gw).await;

        // Upstream cancels at period end; the cache is now stale
        gw.cancel_at_period_end(&state.id).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(reconcile(&mut conn, &gw, user_id).await.unwrap(), ReconcileOutcome::Refreshed);

        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user_id).await.unwrap().unwrap();
        assert!(profile.cancel_at_period_end);

        // Second call converges
        assert_eq!(reconcile(&mut conn, &gw, user_id).await.unwrap(), ReconcileOutcome::Converged);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reconcile_clears_when_gone_upstream(pool: PgPool) {
        let gw = gateway();
        let (user_id, state) = subscribed_user(&pool, &gw).await;

        gw.forget_subscription(&state.id);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            reconcile(&mut conn, &gw, user_id).await.unwrap(),
            ReconcileOutcome::ClearedUpstreamGone
        );

        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status.as_deref(), Some("canceled"));
        assert!(profile.billing_subscription_id.is_none());

        // Nothing left to reconcile afterwards
        assert_eq!(
            reconcile(&mut conn, &gw, user_id).await.unwrap(),
            ReconcileOutcome::NothingToReconcile
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_apply_event_replay_produces_one_record(pool: PgPool) {
        let gw = gateway();
        let (user_id, state) = subscribed_user(&pool, &gw).await;

        let event = BillingEvent::SubscriptionUpdated(state.clone());
        let mut conn = pool.acquire().await.unwrap();
        apply_event(&mut conn, &event).await.unwrap();
        apply_event(&mut conn, &event).await.unwrap();

        let mut subscriptions = Subscriptions::new(&mut conn);
        assert_eq!(subscriptions.list_for_user(user_id).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invoice_failure_marks_past_due(pool: PgPool) {
        let gw = gateway();
        let (user_id, state) = subscribed_user(&pool, &gw).await;

        let event = BillingEvent::InvoicePaymentFailed(InvoiceEvent {
            customer_id: state.customer_id.clone(),
            subscription_id: Some(state.id.clone()),
            amount_minor: 2500,
        });

        let mut conn = pool.acquire().await.unwrap();
        apply_event(&mut conn, &event).await.unwrap();

        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_status.as_deref(), Some("past_due"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_user_falls_back_to_durable_record(pool: PgPool) {
        let gw = gateway();
        let (user_id, state) = subscribed_user(&pool, &gw).await;

        // Simulate a profile that lost its customer id (e.g. cache cleared)
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("UPDATE profiles SET billing_customer_id = NULL WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let resolved = resolve_user(&mut conn, &state.customer_id, Some(&state.id)).await.unwrap();
        assert_eq!(resolved, user_id);
    }
}
