//! Stripe gateway: the processor of record, spoken to over its REST API.
//!
//! Requests are form-encoded per the processor's convention. Every call runs
//! on a client with an explicit timeout; reads retry once on transport
//! failures, mutating calls never retry.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;

use crate::config::StripeConfig;

use super::{
    webhook::{self, BillingEvent},
    BillingError, BillingProvider, CardDetails, Result, SubscriptionState,
};

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: url::Url,
    api_key: String,
    webhook_secret: String,
}

impl StripeGateway {
    pub fn from_config(config: &StripeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build payment processor HTTP client");

        Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<url::Url> {
        self.api_base
            .join(path)
            .map_err(|e| BillingError::InvalidData(format!("invalid processor endpoint {path}: {e}")))
    }

    async fn post_form(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;

        decode_response(response).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.endpoint(path)?;

        // One retry for reads only: GETs are idempotent, POSTs are not.
        let mut last_err = None;
        for attempt in 0..2 {
            let request = self.client.get(url.clone()).bearer_auth(&self.api_key);
            match request.send().await {
                Ok(response) => return decode_response(response).await,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Processor read failed");
                    last_err = Some(transport_error(e));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| BillingError::Unavailable("request not attempted".to_string())))
    }
}

fn transport_error(e: reqwest::Error) -> BillingError {
    if e.is_timeout() {
        BillingError::Unavailable("request to payment processor timed out".to_string())
    } else {
        BillingError::Unavailable(e.to_string())
    }
}

/// Map a processor HTTP response to a value or a categorized error.
///
/// 4xx responses carry an `{"error": {...}}` envelope with a caller-facing
/// message and machine code (e.g. `card_declined`); 5xx means the processor
/// itself is unhealthy.
async fn decode_response(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| BillingError::Unavailable(format!("unreadable processor response: {e}")))?;

    if status.is_success() {
        return Ok(body);
    }

    if status.is_server_error() {
        return Err(BillingError::Unavailable(format!("processor returned {status}")));
    }

    let message = body
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or("payment processor rejected the request")
        .to_string();
    let code = body
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Err(BillingError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl BillingProvider for StripeGateway {
    async fn create_customer(&self, email: &str, name: &str, payment_method: &str) -> Result<String> {
        let body = self
            .post_form(
                "v1/customers",
                &[
                    ("email", email),
                    ("name", name),
                    ("payment_method", payment_method),
                    ("invoice_settings[default_payment_method]", payment_method),
                ],
            )
            .await?;

        body.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| BillingError::InvalidData("customer response missing id".to_string()))
    }

    async fn attach_payment_method(&self, customer_id: &str, payment_method: &str) -> Result<()> {
        self.post_form(
            &format!("v1/payment_methods/{payment_method}/attach"),
            &[("customer", customer_id)],
        )
        .await?;

        self.post_form(
            &format!("v1/customers/{customer_id}"),
            &[("invoice_settings[default_payment_method]", payment_method)],
        )
        .await?;

        Ok(())
    }

    async fn payment_method_details(&self, payment_method: &str) -> Result<CardDetails> {
        let body = self.get_json(&format!("v1/payment_methods/{payment_method}")).await?;

        Ok(CardDetails {
            brand: body.pointer("/card/brand").and_then(|v| v.as_str()).map(|s| s.to_string()),
            last4: body.pointer("/card/last4").and_then(|v| v.as_str()).map(|s| s.to_string()),
        })
    }

    async fn create_subscription(&self, customer_id: &str, price_id: &str) -> Result<SubscriptionState> {
        let body = self
            .post_form(
                "v1/subscriptions",
                &[
                    ("customer", customer_id),
                    ("items[0][price]", price_id),
                    ("expand[0]", "latest_invoice.payment_intent"),
                ],
            )
            .await?;

        SubscriptionState::from_object(&body)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionState>> {
        match self.get_json(&format!("v1/subscriptions/{subscription_id}")).await {
            Ok(body) => Ok(Some(SubscriptionState::from_object(&body)?)),
            // The processor reports deleted/unknown subscriptions as a 404
            // with code resource_missing; that is state, not failure.
            Err(BillingError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<SubscriptionState> {
        let body = self
            .post_form(&format!("v1/subscriptions/{subscription_id}"), &[("cancel_at_period_end", "true")])
            .await?;

        SubscriptionState::from_object(&body)
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
    use crate::billing::SubscriptionStatus;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> StripeGateway {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        StripeGateway::from_config(&crate::config::StripeConfig {
            api_key: "sk_test_fake".to_string(),
            webhook_secret: "whsec_fake".to_string(),
            api_base: server.uri().parse().unwrap(),
            timeout: std::time::Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_create_customer_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(header("authorization", "Bearer sk_test_fake"))
            .and(body_string_contains("email=member%40example.com"))
            .and(body_string_contains("payment_method=pm_card_visa"))
            .and(body_string_contains("invoice_settings%5Bdefault_payment_method%5D=pm_card_visa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cus_new", "object": "customer"})))
            .expect(1)
            .mount(&server)
            .await;

        let customer_id = gateway(&server)
            .create_customer("member@example.com", "Ada Lovelace", "pm_card_visa")
            .await
            .unwrap();

        assert_eq!(customer_id, "cus_new");
    }

    #[tokio::test]
    async fn test_create_subscription_card_declined() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/subscriptions"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {"message": "Your card was declined.", "code": "card_declined", "type": "card_error"}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).create_subscription("cus_1", "price_1").await.unwrap_err();

        match err {
            BillingError::Api { status, code, message } => {
                assert_eq!(status, 402);
                assert_eq!(code.as_deref(), Some("card_declined"));
                assert!(message.contains("declined"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_subscription_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/subscriptions"))
            .and(body_string_contains("customer=cus_1"))
            .and(body_string_contains("items%5B0%5D%5Bprice%5D=price_basic_monthly"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_new",
                "customer": "cus_1",
                "status": "active",
                "cancel_at_period_end": false,
                "current_period_end": 1735689600,
                "items": {"data": [{"price": {"id": "price_basic_monthly"}}]}
            })))
            .mount(&server)
            .await;

        let state = gateway(&server).create_subscription("cus_1", "price_basic_monthly").await.unwrap();

        assert_eq!(state.id, "sub_new");
        assert_eq!(state.status, SubscriptionStatus::Active);
        assert_eq!(state.price_id.as_deref(), Some("price_basic_monthly"));
    }

    #[tokio::test]
    async fn test_retrieve_subscription_gone_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/subscriptions/sub_gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"message": "No such subscription: sub_gone", "code": "resource_missing"}
            })))
            .mount(&server)
            .await;

        let result = gateway(&server).retrieve_subscription("sub_gone").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/subscriptions/sub_1"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = gateway(&server).retrieve_subscription("sub_1").await.unwrap_err();
        assert!(matches!(err, BillingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_cancel_at_period_end_mutation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/subscriptions/sub_1"))
            .and(body_string_contains("cancel_at_period_end=true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "cancel_at_period_end": true,
                "current_period_end": 1735689600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = gateway(&server).cancel_at_period_end("sub_1").await.unwrap();
        assert!(state.cancel_at_period_end);
    }
}
