//! Dummy billing gateway.
//!
//! Keeps customers and subscriptions in memory and reports every payment as
//! successful. Useful for development and for exercising the subscription
//! workflows in tests without a processor account.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::DummyBillingConfig;

use super::{
    webhook::{self, BillingEvent},
    BillingError, BillingProvider, CardDetails, Result, SubscriptionState, SubscriptionStatus,
};

pub struct DummyGateway {
    webhook_secret: String,
    state: Mutex<DummyState>,
}

#[derive(Default)]
struct DummyState {
    customers: HashMap<String, String>,
    subscriptions: HashMap<String, SubscriptionState>,
}

impl DummyGateway {
    pub fn from_config(config: &DummyBillingConfig) -> Self {
        Self {
            webhook_secret: config.webhook_secret.clone(),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Drop a subscription as if it had been deleted on the processor side.
    /// Lets tests exercise the reconcile path for upstream deletions.
    pub fn forget_subscription(&self, subscription_id: &str) {
        self.state.lock().unwrap().subscriptions.remove(subscription_id);
    }
}

#[async_trait]
impl BillingProvider for DummyGateway {
    async fn create_customer(&self, email: &str, _name: &str, _payment_method: &str) -> Result<String> {
        let customer_id = format!("cus_dummy_{}", Uuid::new_v4().simple());
        self.state.lock().unwrap().customers.insert(customer_id.clone(), email.to_string());
        tracing::debug!(customer_id, "Dummy gateway created customer");
        Ok(customer_id)
    }

    async fn attach_payment_method(&self, customer_id: &str, _payment_method: &str) -> Result<()> {
        if self.state.lock().unwrap().customers.contains_key(customer_id) {
            Ok(())
        } else {
            Err(BillingError::Api {
                status: 404,
                code: Some("resource_missing".to_string()),
                message: format!("No such customer: {customer_id}"),
            })
        }
    }

    async fn payment_method_details(&self, _payment_method: &str) -> Result<CardDetails> {
        Ok(CardDetails {
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
        })
    }

    async fn create_subscription(&self, customer_id: &str, price_id: &str) -> Result<SubscriptionState> {
        let state = SubscriptionState {
            id: format!("sub_dummy_{}", Uuid::new_v4().simple()),
            customer_id: customer_id.to_string(),
            status: SubscriptionStatus::Active,
            price_id: Some(price_id.to_string()),
            current_period_end: Some(Utc::now() + Duration::days(30)),
            cancel_at_period_end: false,
            client_secret: None,
        };

        self.state.lock().unwrap().subscriptions.insert(state.id.clone(), state.clone());
        Ok(state)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionState>> {
        Ok(self.state.lock().unwrap().subscriptions.get(subscription_id).cloned())
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<SubscriptionState> {
        let mut state = self.state.lock().unwrap();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| BillingError::Api {
                status: 404,
                code: Some("resource_missing".to_string()),
                message: format!("No such subscription: {subscription_id}"),
            })?;

        subscription.cancel_at_period_end = true;
        Ok(subscription.clone())
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &str) -> Result<BillingEvent> {
        let signature = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or(BillingError::SignatureInvalid)?;

        webhook::verify_signature(
            signature,
            body,
            &self.webhook_secret,
            webhook::DEFAULT_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )?;

        webhook::parse_event(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> DummyGateway {
        DummyGateway::from_config(&DummyBillingConfig {
            webhook_secret: "whsec_dummy".to_string(),
        })
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let gw = gateway();

        let customer = gw.create_customer("a@example.com", "A", "pm_1").await.unwrap();
        gw.attach_payment_method(&customer, "pm_2").await.unwrap();

        let sub = gw.create_subscription(&customer, "price_1").await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(!sub.cancel_at_period_end);

        let fetched = gw.retrieve_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(fetched, sub);

        let canceled = gw.cancel_at_period_end(&sub.id).await.unwrap();
        assert!(canceled.cancel_at_period_end);

        gw.forget_subscription(&sub.id);
        assert!(gw.retrieve_subscription(&sub.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_to_unknown_customer_fails() {
        let gw = gateway();
        let err = gw.attach_payment_method("cus_nope", "pm_1").await.unwrap_err();
        assert!(matches!(err, BillingError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_webhook_verification_uses_shared_secret() {
        let gw = gateway();
        let body = r#"{"type":"invoice.payment_succeeded","data":{"object":{"customer":"cus_1","amount_due":100}}}"#;
        let now = Utc::now().timestamp();

        let mut headers = HeaderMap::new();
        headers.insert(
            webhook::SIGNATURE_HEADER,
            webhook::signature_header(now, body, "whsec_dummy").parse().unwrap(),
        );
        assert!(gw.verify_webhook(&headers, body).is_ok());

        let mut bad = HeaderMap::new();
        bad.insert(
            webhook::SIGNATURE_HEADER,
            webhook::signature_header(now, body, "whsec_wrong").parse().unwrap(),
        );
        assert!(matches!(gw.verify_webhook(&bad, body), Err(BillingError::SignatureInvalid)));
    }
}
