//! Common Test Utilities
//!
//! Builds the real router over a lazily-connected pool and no Redis, so
//! every path that fails before touching storage can be exercised without
//! external services.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use koihire::config::testing::test_settings;
use koihire::config::Settings;
use koihire::infrastructure::database;
use koihire::infrastructure::payments::ManualProvider;
use koihire::startup::{build_router, AppState};

/// Test application wrapping the production router
pub struct TestApp {
    pub router: Router,
    pub settings: Settings,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let db = database::create_lazy_pool(&settings.database).expect("lazy pool");
        let state = AppState::new(settings.clone(), db, None, Arc::new(ManualProvider));
        Self {
            router: build_router(state),
            settings,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> Response {
        self.send(
            Request::get(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

/// Read the response body as JSON
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and the `{code, message}` error envelope
pub async fn assert_error(response: Response, status: StatusCode, code: u64) -> Value {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    assert_eq!(body["code"], code, "unexpected body: {}", body);
    assert!(body["message"].is_string());
    body
}

/// Generate a unique test email
pub fn unique_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}
