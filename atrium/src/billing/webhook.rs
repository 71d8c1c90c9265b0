//! Webhook signature verification and event parsing.
//!
//! The processor signs each delivery with HMAC-SHA256 over
//! `{timestamp}.{payload}` and sends the result in a `t=<ts>,v1=<hex>`
//! header. Verification recomputes the MAC with the shared secret, checks
//! the timestamp against a tolerance window, and compares in constant time.
//!
//! Events are parsed into the [`BillingEvent`] enum so dispatch is an
//! exhaustive match rather than string comparisons scattered through the
//! handler.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{BillingError, Result, SubscriptionState};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the processor signature.
pub const SIGNATURE_HEADER: &str = "billing-signature";

/// Maximum allowed clock skew between the signature timestamp and now.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Sign a payload for the given timestamp.
///
/// Returns the hex-encoded HMAC-SHA256 of `{timestamp}.{payload}`.
pub fn sign_payload(timestamp: i64, payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}

/// Build a complete signature header value (used by tests and the dummy provider).
pub fn signature_header(timestamp: i64, payload: &str, secret: &str) -> String {
    format!("t={},v1={}", timestamp, sign_payload(timestamp, payload, secret))
}

/// Verify a signature header against the raw payload.
///
/// `now` is passed in so callers (and tests) control the clock. The header
/// may carry multiple `v1` entries; any valid one passes.
pub fn verify_signature(header: &str, payload: &str, secret: &str, tolerance_secs: i64, now: i64) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::SignatureInvalid)?;
    if candidates.is_empty() {
        return Err(BillingError::SignatureInvalid);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(BillingError::SignatureInvalid);
    }

    let expected = sign_payload(timestamp, payload, secret);
    if candidates.iter().any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes())) {
        Ok(())
    } else {
        Err(BillingError::SignatureInvalid)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// A verified, typed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    SubscriptionCreated(SubscriptionState),
    SubscriptionUpdated(SubscriptionState),
    SubscriptionDeleted(SubscriptionState),
    InvoicePaymentSucceeded(InvoiceEvent),
    InvoicePaymentFailed(InvoiceEvent),
    /// Recognized envelope, event kind we don't act on. Acknowledged with 200.
    Ignored { event_type: String },
}

/// The slice of an invoice event we act on.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceEvent {
    pub customer_id: String,
    pub subscription_id: Option<String>,
    /// Amount in the processor's integer minor units (cents)
    pub amount_minor: i64,
}

/// Parse a raw webhook body into a [`BillingEvent`].
///
/// Malformed envelopes are client errors; unknown event types are not.
pub fn parse_event(body: &str) -> Result<BillingEvent> {
    let envelope: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BillingError::InvalidData(format!("malformed webhook payload: {e}")))?;

    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BillingError::InvalidData("webhook payload missing type".to_string()))?;

    let object = envelope
        .pointer("/data/object")
        .ok_or_else(|| BillingError::InvalidData("webhook payload missing data.object".to_string()))?;

    let event = match event_type {
        "customer.subscription.created" => BillingEvent::SubscriptionCreated(SubscriptionState::from_object(object)?),
        "customer.subscription.updated" => BillingEvent::SubscriptionUpdated(SubscriptionState::from_object(object)?),
        "customer.subscription.deleted" => BillingEvent::SubscriptionDeleted(SubscriptionState::from_object(object)?),
        "invoice.payment_succeeded" => BillingEvent::InvoicePaymentSucceeded(parse_invoice(object)?),
        "invoice.payment_failed" => BillingEvent::InvoicePaymentFailed(parse_invoice(object)?),
        other => BillingEvent::Ignored {
            event_type: other.to_string(),
        },
    };

    Ok(event)
}

fn parse_invoice(object: &serde_json::Value) -> Result<InvoiceEvent> {
    let customer_id = object
        .get("customer")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BillingError::InvalidData("invoice object missing customer".to_string()))?
        .to_string();

    let subscription_id = object.get("subscription").and_then(|v| v.as_str()).map(|s| s.to_string());

    let amount_minor = object.get("amount_due").and_then(|v| v.as_i64()).unwrap_or(0);

    Ok(InvoiceEvent {
        customer_id,
        subscription_id,
        amount_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::SubscriptionStatus;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret_for_unit_tests";

    #[test]
    fn test_sign_and_verify() {
        let timestamp = 1704067200;
        let payload = r#"{"type":"customer.subscription.updated","data":{}}"#;

        let header = signature_header(timestamp, payload, SECRET);
        assert!(header.starts_with("t=1704067200,v1="));

        assert!(verify_signature(&header, payload, SECRET, DEFAULT_TOLERANCE_SECS, timestamp).is_ok());

        // Tampered payload fails
        assert!(verify_signature(&header, "tampered", SECRET, DEFAULT_TOLERANCE_SECS, timestamp).is_err());

        // Wrong secret fails
        assert!(verify_signature(&header, payload, "whsec_other", DEFAULT_TOLERANCE_SECS, timestamp).is_err());
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let timestamp = 1704067200;
        let payload = "{}";
        let header = signature_header(timestamp, payload, SECRET);

        // Just inside the window
        assert!(verify_signature(&header, payload, SECRET, 300, timestamp + 299).is_ok());
        // Just outside
        assert!(verify_signature(&header, payload, SECRET, 300, timestamp + 301).is_err());
        // Timestamps from the future are equally suspect
        assert!(verify_signature(&header, payload, SECRET, 300, timestamp - 301).is_err());
    }

    #[test]
    fn test_verify_rejects_malformed_headers() {
        let payload = "{}";
        for header in ["", "v1=abc", "t=notanumber,v1=abc", "t=1704067200"] {
            assert!(
                verify_signature(header, payload, SECRET, DEFAULT_TOLERANCE_SECS, 1704067200).is_err(),
                "header should be rejected: {header}"
            );
        }
    }

    #[test]
    fn test_verify_accepts_any_valid_v1_entry() {
        let timestamp = 1704067200;
        let payload = "{}";
        let good = sign_payload(timestamp, payload, SECRET);
        let header = format!("t={timestamp},v1=deadbeef,v1={good}");

        assert!(verify_signature(&header, payload, SECRET, DEFAULT_TOLERANCE_SECS, timestamp).is_ok());
    }

    #[test]
    fn test_parse_subscription_event() {
        let body = json!({
            "type": "customer.subscription.updated",
            "data": {"object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "cancel_at_period_end": true,
                "current_period_end": 1704067200
            }}
        })
        .to_string();

        match parse_event(&body).unwrap() {
            BillingEvent::SubscriptionUpdated(state) => {
                assert_eq!(state.id, "sub_1");
                assert_eq!(state.status, SubscriptionStatus::PastDue);
                assert!(state.cancel_at_period_end);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_invoice_event() {
        let body = json!({
            "type": "invoice.payment_failed",
            "data": {"object": {
                "customer": "cus_9",
                "subscription": "sub_9",
                "amount_due": 2500
            }}
        })
        .to_string();

        match parse_event(&body).unwrap() {
            BillingEvent::InvoicePaymentFailed(invoice) => {
                assert_eq!(invoice.customer_id, "cus_9");
                assert_eq!(invoice.subscription_id.as_deref(), Some("sub_9"));
                assert_eq!(invoice.amount_minor, 2500);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_event_is_ignored_not_error() {
        let body = json!({
            "type": "customer.tax_id.created",
            "data": {"object": {}}
        })
        .to_string();

        assert_eq!(
            parse_event(&body).unwrap(),
            BillingEvent::Ignored {
                event_type: "customer.tax_id.created".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(parse_event("not json").is_err());
        assert!(parse_event(r#"{"data":{"object":{}}}"#).is_err());
        assert!(parse_event(r#"{"type":"customer.subscription.created"}"#).is_err());
    }
}
