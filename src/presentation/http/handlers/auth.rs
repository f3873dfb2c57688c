//! Authentication Handlers
//!
//! Register, login, refresh and logout. Access tokens are short-lived JWTs;
//! refresh tokens are opaque and rotated on every use.

use axum::{extract::State, http::StatusCode, Json};

use crate::application::dto::request::{LoginRequest, RefreshTokenRequest, RegisterRequest};
use crate::application::dto::response::{AuthResponse, TokenResponse};
use crate::application::services::AuthService;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (user, tokens) = state.auth_service().register(body.into()).await?;
    tracing::info!(user_id = user.id, role = %user.role, "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(user, tokens))))
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, tokens) = state
        .auth_service()
        .authenticate(&body.email, &body.password)
        .await?;
    Ok(Json(AuthResponse::new(user, tokens)))
}

/// `POST /auth/refresh`
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let tokens = state
        .auth_service()
        .refresh_token(&body.refresh_token)
        .await?;
    Ok(Json(tokens.into()))
}

/// `POST /auth/logout`. Always succeeds so clients can clear state.
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefreshTokenRequest>,
) -> StatusCode {
    if let Err(e) = state.auth_service().revoke_token(&body.refresh_token).await {
        tracing::debug!(error = %e, "Logout with unknown refresh token");
    }
    StatusCode::NO_CONTENT
}
