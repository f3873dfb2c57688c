//! Stripe Webhook Tests
//!
//! Signature checks run before any escrow lookup. An ignored event type is
//! acknowledged without touching storage.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use koihire::infrastructure::payments::webhook::sign_payload;

use crate::common::{assert_error, json_body, TestApp};

const URI: &str = "/api/v1/webhooks/stripe";
const IGNORED_EVENT: &str =
    r#"{"type":"customer.created","data":{"object":{"id":"cus_123"}}}"#;

fn webhook(payload: &'static str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::post(URI).header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload)).unwrap()
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = TestApp::new();

    let response = app.send(webhook(IGNORED_EVENT, None)).await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let app = TestApp::new();
    let signature = sign_payload(IGNORED_EVENT.as_bytes(), "whsec_other", Utc::now().timestamp());

    let response = app.send(webhook(IGNORED_EVENT, Some(signature))).await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let app = TestApp::new();
    let stale = Utc::now().timestamp() - app.settings.payments.webhook_tolerance_secs - 60;
    let signature = sign_payload(IGNORED_EVENT.as_bytes(), "whsec_test", stale);

    let response = app.send(webhook(IGNORED_EVENT, Some(signature))).await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_unconfigured_secret_rejects_everything() {
    let mut settings = koihire::config::testing::test_settings();
    settings.payments.stripe_webhook_secret = None;
    let app = TestApp::with_settings(settings);
    let signature = sign_payload(IGNORED_EVENT.as_bytes(), "whsec_test", Utc::now().timestamp());

    let response = app.send(webhook(IGNORED_EVENT, Some(signature))).await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_signed_ignored_event_is_acknowledged() {
    let app = TestApp::new();
    let signature = sign_payload(IGNORED_EVENT.as_bytes(), "whsec_test", Utc::now().timestamp());

    let response = app.send(webhook(IGNORED_EVENT, Some(signature))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["received"], true);
}

#[tokio::test]
async fn test_signed_malformed_payload_is_bad_request() {
    let app = TestApp::new();
    let payload = r#"{"not":"an event"}"#;
    let signature = sign_payload(payload.as_bytes(), "whsec_test", Utc::now().timestamp());

    let response = app.send(webhook(payload, Some(signature))).await;

    assert_error(response, StatusCode::BAD_REQUEST, 10002).await;
}
