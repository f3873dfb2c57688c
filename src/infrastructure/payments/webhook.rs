//! Stripe webhook verification.
//!
//! `Stripe-Signature: t=<unix>,v1=<hex hmac>[,v1=...]`. The signed payload
//! is `"{t}.{raw body}"`, HMAC-SHA256 keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::application::payments::{PaymentError, PaymentEvent};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    kind: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeEventObject,
}

#[derive(Debug, Deserialize)]
struct StripeEventObject {
    id: String,
    last_payment_error: Option<StripePaymentError>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentError {
    message: Option<String>,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    Some(SignatureHeader {
        timestamp: timestamp?,
        signatures,
    })
}

/// Check `header` against `payload` and decode the event.
///
/// `now` is the current unix time; events signed more than `tolerance_secs`
/// away from it are rejected to stop replays.
pub fn verify_stripe_webhook(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<PaymentEvent, PaymentError> {
    let parsed = parse_header(header).ok_or(PaymentError::InvalidSignature)?;
    // The header is unauthenticated here, so the distance must not overflow
    if now.abs_diff(parsed.timestamp) > tolerance_secs.max(0) as u64 {
        tracing::warn!(timestamp = parsed.timestamp, now, "Webhook timestamp outside tolerance");
        return Err(PaymentError::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time; clone per candidate.
    let valid = parsed
        .signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
    if !valid {
        return Err(PaymentError::InvalidSignature);
    }

    parse_event(payload)
}

fn parse_event(payload: &[u8]) -> Result<PaymentEvent, PaymentError> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;

    Ok(match event.kind.as_str() {
        "payment_intent.succeeded" => PaymentEvent::PaymentSucceeded {
            intent_id: event.data.object.id,
        },
        "payment_intent.payment_failed" => PaymentEvent::PaymentFailed {
            reason: event
                .data
                .object
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment failed".to_string()),
            intent_id: event.data.object.id,
        },
        _ => PaymentEvent::Ignored { kind: event.kind },
    })
}

/// Produce a `Stripe-Signature` header value for `payload`.
#[doc(hidden)]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}
