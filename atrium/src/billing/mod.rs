//! Payment provider abstraction layer.
//!
//! This module defines the [`BillingProvider`] trait which abstracts the
//! subscription operations the platform needs from the external payment
//! processor, plus the processor-agnostic types they exchange. The concrete
//! implementations are [`stripe::StripeGateway`] (the processor of record,
//! spoken to over its REST API) and [`dummy::DummyGateway`] (an in-memory
//! stand-in for tests and development).
//!
//! The processor is the source of truth for subscription state. Everything
//! stored locally (the per-profile cache and the durable `subscriptions`
//! records) is a copy, kept in sync by [`sync`].

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BillingConfig;

pub mod dummy;
pub mod stripe;
pub mod sync;
pub mod webhook;

/// Create a billing provider from configuration.
///
/// This is the single point where config becomes a provider instance.
/// Adding a new processor means adding a match arm here.
pub fn create_provider(config: &BillingConfig) -> std::sync::Arc<dyn BillingProvider> {
    match config {
        BillingConfig::Stripe(stripe_config) => std::sync::Arc::new(stripe::StripeGateway::from_config(stripe_config)),
        BillingConfig::Dummy(dummy_config) => std::sync::Arc::new(dummy::DummyGateway::from_config(dummy_config)),
    }
}

/// Result type for billing operations
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur while talking to the payment processor.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The processor rejected the request (caller-correctable, e.g. a card
    /// decline or an unknown payment method).
    #[error("Payment processor rejected the request: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The processor could not be reached or answered with a server error.
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),

    /// A processor response or webhook payload did not have the expected shape.
    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    /// Webhook signature verification failed.
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    /// Operation requires a processor customer that the user does not have.
    #[error("User has no payment processor customer record")]
    NoCustomer,
}

impl BillingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Api { .. } => StatusCode::BAD_REQUEST,
            BillingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::InvalidData(_) => StatusCode::BAD_REQUEST,
            BillingError::SignatureInvalid => StatusCode::BAD_REQUEST,
            BillingError::NoCustomer => StatusCode::BAD_REQUEST,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            BillingError::Api { message, code, .. } => match code {
                Some(code) => format!("{message} ({code})"),
                None => message.clone(),
            },
            BillingError::Unavailable(_) => "The payment service is temporarily unavailable. Please try again.".to_string(),
            BillingError::InvalidData(msg) => msg.clone(),
            BillingError::SignatureInvalid => "Invalid webhook signature".to_string(),
            BillingError::NoCustomer => "No billing account exists for this user".to_string(),
        }
    }
}

/// Subscription status as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Ok(SubscriptionStatus::IncompleteExpired),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            other => Err(BillingError::InvalidData(format!("unknown subscription status: {other}"))),
        }
    }

    /// A subscription that is currently entitling the member to access.
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

/// Card display details, captured best-effort for the profile cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
}

/// The processor's view of a subscription, normalized.
///
/// Processor timestamps arrive as Unix epoch seconds and are converted to
/// explicit UTC timestamps at the boundary; nothing downstream handles raw
/// epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    /// Processor-side subscription id ("sub_...")
    pub id: String,
    /// Processor-side customer id ("cus_...")
    pub customer_id: String,
    pub status: SubscriptionStatus,
    /// Price the subscription is billed against, used to resolve the local plan
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// Present when the subscription is incomplete and the client must
    /// confirm the initial payment.
    pub client_secret: Option<String>,
}

impl SubscriptionState {
    /// Parse a subscription object as the processor serializes it.
    pub fn from_object(object: &serde_json::Value) -> Result<Self> {
        let id = object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidData("subscription object missing id".to_string()))?
            .to_string();

        // `customer` is either a bare id or an expanded object
        let customer_id = match object.get("customer") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Object(o)) => o
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| BillingError::InvalidData("expanded customer missing id".to_string()))?
                .to_string(),
            _ => return Err(BillingError::InvalidData("subscription object missing customer".to_string())),
        };

        let status = object
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidData("subscription object missing status".to_string()))
            .and_then(SubscriptionStatus::parse)?;

        let price_id = object
            .pointer("/items/data/0/price/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let current_period_end = object
            .get("current_period_end")
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        let cancel_at_period_end = object.get("cancel_at_period_end").and_then(|v| v.as_bool()).unwrap_or(false);

        let client_secret = object
            .pointer("/latest_invoice/payment_intent/client_secret")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            id,
            customer_id,
            status,
            price_id,
            current_period_end,
            cancel_at_period_end,
            client_secret,
        })
    }
}

/// Abstract payment processor interface.
///
/// Mutating calls are never retried internally (they carry no idempotency
/// keys); idempotent reads may retry once on transport failures. Every call
/// runs under an explicit timeout.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer with the given payment method attached and set as
    /// the default for invoices. Returns the processor customer id.
    async fn create_customer(&self, email: &str, name: &str, payment_method: &str) -> Result<String>;

    /// Attach a payment method to an existing customer and make it the
    /// default for invoices.
    async fn attach_payment_method(&self, customer_id: &str, payment_method: &str) -> Result<()>;

    /// Fetch card display details for a payment method. Callers treat this
    /// as best-effort.
    async fn payment_method_details(&self, payment_method: &str) -> Result<CardDetails>;

    /// Create a subscription for the customer against the given price.
    async fn create_subscription(&self, customer_id: &str, price_id: &str) -> Result<SubscriptionState>;

    /// Fetch the authoritative state of a subscription. Returns `Ok(None)`
    /// when the processor no longer knows the id (deleted upstream).
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionState>>;

    /// Instruct the processor to cancel the subscription at period end.
    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<SubscriptionState>;

    /// Verify a webhook delivery against the shared secret and parse it into
    /// a typed event. Fails with [`BillingError::SignatureInvalid`] before
    /// the payload is even parsed.
    fn verify_webhook(&self, headers: &HeaderMap, body: &str) -> Result<webhook::BillingEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_state_from_object() {
        let object = json!({
            "id": "sub_123",
            "customer": "cus_456",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_end": 1704067200,
            "items": {"data": [{"price": {"id": "price_basic_monthly"}}]}
        });

        let state = SubscriptionState::from_object(&object).unwrap();
        assert_eq!(state.id, "sub_123");
        assert_eq!(state.customer_id, "cus_456");
        assert_eq!(state.status, SubscriptionStatus::Active);
        assert_eq!(state.price_id.as_deref(), Some("price_basic_monthly"));
        assert!(!state.cancel_at_period_end);
        // 2024-01-01 00:00:00 UTC
        assert_eq!(state.current_period_end.unwrap().timestamp(), 1704067200);
        assert!(state.client_secret.is_none());
    }

    #[test]
    fn test_subscription_state_expanded_customer_and_secret() {
        let object = json!({
            "id": "sub_abc",
            "customer": {"id": "cus_abc", "email": "a@example.com"},
            "status": "incomplete",
            "latest_invoice": {"payment_intent": {"client_secret": "pi_secret_xyz"}}
        });

        let state = SubscriptionState::from_object(&object).unwrap();
        assert_eq!(state.customer_id, "cus_abc");
        assert_eq!(state.status, SubscriptionStatus::Incomplete);
        assert_eq!(state.client_secret.as_deref(), Some("pi_secret_xyz"));
        assert!(state.current_period_end.is_none());
    }

    #[test]
    fn test_subscription_state_rejects_missing_fields() {
        assert!(SubscriptionState::from_object(&json!({"customer": "cus_1", "status": "active"})).is_err());
        assert!(SubscriptionState::from_object(&json!({"id": "sub_1", "status": "active"})).is_err());
        assert!(SubscriptionState::from_object(&json!({"id": "sub_1", "customer": "cus_1", "status": "weird"})).is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Unpaid,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SubscriptionStatus::parse("paused_forever").is_err());
    }

    #[test]
    fn test_entitlement() {
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(!SubscriptionStatus::PastDue.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
    }
}
