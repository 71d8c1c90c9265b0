use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    api::models::{
        subscriptions::{
            SubscriptionCancelResponse, SubscriptionCreateRequest, SubscriptionCreateResponse, SubscriptionRecordResponse,
            SubscriptionStatusQuery, SubscriptionStatusResponse,
        },
        users::CurrentUser,
    },
    billing::{sync, BillingProvider},
    db::handlers::{Profiles, Subscriptions},
    errors::{Error, Result},
    AppState,
};

fn provider(state: &AppState) -> Result<&Arc<dyn BillingProvider>> {
    state.billing.as_ref().ok_or_else(|| Error::BadRequest {
        message: "No payment processor is configured".to_string(),
    })
}

/// Create a subscription for the authenticated member.
///
/// Stage-by-stage semantics: validation fails before any mutation; a
/// customer-creation failure leaves nothing behind; once the customer
/// exists its id is committed immediately, so a later subscription-creation
/// failure (e.g. card decline) leaves the customer and payment method in
/// place for a retry. Card display details are captured best-effort.
#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "subscriptions",
    request_body = SubscriptionCreateRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionCreateResponse),
        (status = 400, description = "Invalid payment method, unknown price, or card declined"),
        (status = 503, description = "Payment processor unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<SubscriptionCreateRequest>,
) -> Result<(StatusCode, Json<SubscriptionCreateResponse>)> {
    let billing = provider(&state)?;

    if request.payment_method_id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "payment_method_id is required".to_string(),
        });
    }
    if request.price_id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "price_id is required".to_string(),
        });
    }

    let profile = {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut profiles = Profiles::new(&mut conn);
        match profiles.get_by_user(user.id).await? {
            Some(profile) => profile,
            None => profiles.create(user.id).await?,
        }
    };

    // Ensure a processor customer exists with this payment method as default
    let customer_id = match &profile.billing_customer_id {
        Some(customer_id) => {
            billing.attach_payment_method(customer_id, &request.payment_method_id).await?;
            customer_id.clone()
        }
        None => {
            let full_name = format!("{} {}", user.first_name, user.last_name);
            let customer_id = billing
                .create_customer(&user.email, full_name.trim(), &request.payment_method_id)
                .await?;

            // Commit the customer id immediately: it must survive any
            // failure in the steps below.
            let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut profiles = Profiles::new(&mut conn);
            profiles.set_billing_customer(user.id, &customer_id).await?;
            customer_id
        }
    };

    // Card display details are cosmetic; failure to fetch them never blocks
    let card = match billing.payment_method_details(&request.payment_method_id).await {
        Ok(card) => card,
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch payment method details");
            Default::default()
        }
    };
    {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut profiles = Profiles::new(&mut conn);
        profiles
            .set_payment_method(user.id, &request.payment_method_id, card.brand.as_deref(), card.last4.as_deref())
            .await?;
    }

    // The mutating call: never retried, failures surface to the caller with
    // the customer/payment-method changes above intentionally kept.
    let subscription = billing.create_subscription(&customer_id, &request.price_id).await?;

    {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        sync::apply_subscription_state(&mut conn, user.id, &subscription).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionCreateResponse {
            subscription_id: subscription.id,
            status: subscription.status.as_str().to_string(),
            client_secret: subscription.client_secret,
        }),
    ))
}

/// Read the cached subscription summary, optionally reconciling with the
/// processor first (`?refresh=true`).
#[utoipa::path(
    get,
    path = "/subscriptions/status",
    tag = "subscriptions",
    params(SubscriptionStatusQuery),
    responses(
        (status = 200, description = "Subscription summary", body = SubscriptionStatusResponse),
        (status = 404, description = "No profile for this user"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id, refresh = query.refresh))]
pub async fn subscription_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SubscriptionStatusQuery>,
) -> Result<Json<SubscriptionStatusResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let mut refreshed = false;
    if query.refresh {
        if let Some(billing) = state.billing.as_ref() {
            sync::reconcile(&mut conn, billing.as_ref(), user.id).await?;
            refreshed = true;
        }
    }

    let mut profiles = Profiles::new(&mut conn);
    let profile = profiles.get_by_user(user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        detail: user.id.to_string(),
    })?;

    Ok(Json(SubscriptionStatusResponse {
        status: profile.subscription_status,
        subscription_id: profile.billing_subscription_id,
        current_period_end: profile.current_period_end,
        cancel_at_period_end: profile.cancel_at_period_end,
        card_brand: profile.card_brand,
        card_last4: profile.card_last4,
        refreshed,
    }))
}

/// Schedule the member's subscription for cancellation at period end.
///
/// "Nothing to cancel" and "already scheduled to cancel" are both 404-class
/// with distinct messages; the latter performs no upstream call.
#[utoipa::path(
    post,
    path = "/subscriptions/cancel",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Cancellation scheduled", body = SubscriptionCancelResponse),
        (status = 404, description = "No active subscription, or cancellation already scheduled"),
        (status = 503, description = "Payment processor unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<SubscriptionCancelResponse>> {
    let billing = provider(&state)?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let subscription_id = {
        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user.id).await?.ok_or_else(|| Error::NotFound {
            resource: "Profile".to_string(),
            detail: user.id.to_string(),
        })?;
        profile.billing_subscription_id.ok_or_else(|| Error::NotFound {
            resource: "Subscription".to_string(),
            detail: "no active subscription to cancel".to_string(),
        })?
    };

    let current = billing.retrieve_subscription(&subscription_id).await?;
    let Some(current) = current else {
        // Gone upstream: make the local cache say so and report nothing to cancel
        sync::clear_subscription_state(&mut conn, user.id, &subscription_id).await?;
        return Err(Error::NotFound {
            resource: "Subscription".to_string(),
            detail: "no active subscription to cancel".to_string(),
        });
    };

    if !current.status.is_entitled() {
        sync::apply_subscription_state(&mut conn, user.id, &current).await?;
        return Err(Error::NotFound {
            resource: "Subscription".to_string(),
            detail: "no active subscription to cancel".to_string(),
        });
    }

    if current.cancel_at_period_end {
        // Same error class as "nothing to cancel", different content; the
        // processor is not asked again.
        sync::apply_subscription_state(&mut conn, user.id, &current).await?;
        return Err(Error::NotFound {
            resource: "Subscription".to_string(),
            detail: "cancellation is already scheduled for the end of the billing period".to_string(),
        });
    }

    let canceled = billing.cancel_at_period_end(&subscription_id).await?;
    sync::apply_subscription_state(&mut conn, user.id, &canceled).await?;

    Ok(Json(SubscriptionCancelResponse {
        subscription_id: canceled.id,
        status: canceled.status.as_str().to_string(),
        cancel_at_period_end: canceled.cancel_at_period_end,
        current_period_end: canceled.current_period_end,
        message: "Subscription will cancel at the end of the billing period".to_string(),
    }))
}

/// The member's durable subscription history.
#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Subscription history", body = Vec<SubscriptionRecordResponse>),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_subscriptions(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<SubscriptionRecordResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Subscriptions::new(&mut conn);

    let records = repo.list_for_user(user.id).await?;
    Ok(Json(records.into_iter().map(SubscriptionRecordResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationHub, Notifier};
    use sqlx::PgPool;

    fn test_state(pool: PgPool) -> AppState {
        let mut config = crate::test_utils::create_test_config();
        config.billing = Some(crate::config::BillingConfig::Dummy(crate::config::DummyBillingConfig::default()));
        let billing = crate::billing::create_provider(config.billing.as_ref().unwrap());

        AppState::builder()
            .db(pool.clone())
            .config(config)
            .billing(billing)
            .notifier(Notifier::new(pool, std::sync::Arc::new(NotificationHub::new())))
            .build()
    }

    async fn member(pool: &PgPool) -> CurrentUser {
        CurrentUser::from(crate::test_utils::create_test_user(pool).await)
    }

    fn create_request() -> SubscriptionCreateRequest {
        SubscriptionCreateRequest {
            payment_method_id: "pm_card_visa".to_string(),
            price_id: "price_basic_monthly".to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_populates_cache_and_durable_record(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = member(&pool).await;

        let (status, Json(response)) = create_subscription(State(state.clone()), user.clone(), Json(create_request()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.status, "active");

        let mut conn = pool.acquire().await.unwrap();
        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(profile.billing_subscription_id.as_deref(), Some(response.subscription_id.as_str()));
        assert_eq!(profile.subscription_status.as_deref(), Some("active"));
        assert_eq!(profile.card_brand.as_deref(), Some("visa"));
        assert_eq!(profile.card_last4.as_deref(), Some("4242"));

        let mut records = Subscriptions::new(&mut conn);
        let history = records.list_for_user(user.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].external_id, response.subscription_id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_validates_before_any_mutation(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = member(&pool).await;

        let request = SubscriptionCreateRequest {
            payment_method_id: "".to_string(),
            price_id: "price_basic_monthly".to_string(),
        };

        let err = create_subscription(State(state), user.clone(), Json(request)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let mut conn = pool.acquire().await.unwrap();
        let mut profiles = Profiles::new(&mut conn);
        let profile = profiles.get_by_user(user.id).await.unwrap().unwrap();
        assert!(profile.billing_customer_id.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cancel_distinguishes_missing_from_already_scheduled(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = member(&pool).await;

        // Nothing to cancel yet: 404-class
        let err = cancel_subscription(State(state.clone()), user.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.user_message().contains("no active subscription"));

        // Subscribe, then cancel at period end
        create_subscription(State(state.clone()), user.clone(), Json(create_request()))
            .await
            .unwrap();
        let Json(canceled) = cancel_subscription(State(state.clone()), user.clone()).await.unwrap();
        assert!(canceled.cancel_at_period_end);

        // Second cancel: same error class, distinct content, no upstream call repeated
        let err = cancel_subscription(State(state), user).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.user_message().contains("already scheduled"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_status_refresh_reconciles_drift(pool: PgPool) {
        let state = test_state(pool.clone());
        let user = member(&pool).await;

        create_subscription(State(state.clone()), user.clone(), Json(create_request()))
            .await
            .unwrap();

        // Drift the local cache away from the processor's view
        sqlx::query("UPDATE profiles SET subscription_status = 'past_due' WHERE user_id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        // A plain read serves the stale cache
        let Json(stale) = subscription_status(
            State(state.clone()),
            user.clone(),
            Query(SubscriptionStatusQuery { refresh: false }),
        )
        .await
        .unwrap();
        assert_eq!(stale.status.as_deref(), Some("past_due"));
        assert!(!stale.refreshed);

        // refresh=true reconciles against the processor
        let Json(fresh) = subscription_status(State(state), user, Query(SubscriptionStatusQuery { refresh: true }))
            .await
            .unwrap();
        assert_eq!(fresh.status.as_deref(), Some("active"));
        assert!(fresh.refreshed);
    }
}
