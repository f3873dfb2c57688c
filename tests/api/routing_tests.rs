//! Routing Tests
//!
//! Path parsing, method handling and the realtime endpoint.

use axum::http::StatusCode;
use serde_json::json;

use crate::common::{assert_error, TestApp};

#[tokio::test]
async fn test_invalid_id_in_public_route() {
    let app = TestApp::new();

    let response = app.get("/api/v1/projects/not-a-number").await;

    let body = assert_error(response, StatusCode::BAD_REQUEST, 10002).await;
    assert_eq!(body["message"], "Invalid project ID");
}

#[tokio::test]
async fn test_non_positive_id_rejected() {
    let app = TestApp::new();

    let response = app.get("/api/v1/services/0").await;

    assert_error(response, StatusCode::BAD_REQUEST, 10002).await;
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/api/v1/invoices").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_method_on_public_route() {
    let app = TestApp::new();

    let response = app.post_json("/api/v1/freelancers", &json!({})).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_protected_route_authenticates_before_method_check() {
    let app = TestApp::new();

    let response = app.get("/api/v1/reviews").await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_realtime_requires_websocket_upgrade() {
    let app = TestApp::new();

    let response = app.get("/api/v1/realtime").await;

    assert!(response.status().is_client_error());
}
