//! Authentication API Tests
//!
//! Validation and token checks that reject a request before any storage
//! access.

use axum::http::StatusCode;
use serde_json::json;

use crate::common::{assert_error, unique_email, TestApp};

#[tokio::test]
async fn test_register_with_invalid_email_fails() {
    let app = TestApp::new();
    let body = json!({
        "email": "not-an-email",
        "username": "koi_fan",
        "password": "ValidPassword123!",
        "role": "CLIENT"
    });

    let response = app.post_json("/api/v1/auth/register", &body).await;

    let body = assert_error(response, StatusCode::BAD_REQUEST, 10007).await;
    assert!(body["message"].as_str().unwrap().starts_with("email:"));
}

#[tokio::test]
async fn test_register_with_short_password_fails() {
    let app = TestApp::new();
    let body = json!({
        "email": unique_email(),
        "username": "koi_fan",
        "password": "short",
        "role": "FREELANCER"
    });

    let response = app.post_json("/api/v1/auth/register", &body).await;

    assert_error(response, StatusCode::BAD_REQUEST, 10007).await;
}

#[tokio::test]
async fn test_register_with_unknown_role_fails() {
    let app = TestApp::new();
    let body = json!({
        "email": unique_email(),
        "username": "koi_fan",
        "password": "ValidPassword123!",
        "role": "OVERLORD"
    });

    let response = app.post_json("/api/v1/auth/register", &body).await;

    assert_error(response, StatusCode::BAD_REQUEST, 10002).await;
}

#[tokio::test]
async fn test_register_with_malformed_json_fails() {
    let app = TestApp::new();

    let response = app.post_raw("/api/v1/auth/register", "{\"email\":").await;

    assert_error(response, StatusCode::BAD_REQUEST, 10002).await;
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new();

    let response = app.get("/api/v1/users/me").await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = TestApp::new();

    let response = app.get_auth("/api/v1/orders/mine", "not.a.jwt").await;

    assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = TestApp::new();

    for uri in ["/api/v1/admin/stats", "/api/v1/admin/disputes", "/api/v1/admin/payouts"] {
        let response = app.get(uri).await;
        assert_error(response, StatusCode::UNAUTHORIZED, 10003).await;
    }
}
