//! Escrow Handlers
//!
//! Funding goes through the configured payment provider. Stripe confirms
//! asynchronously via the webhook below; the manual provider confirms
//! inline.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::application::dto::response::{EscrowResponse, FundingResponse};
use crate::application::services::EscrowService;
use crate::application::Actor;
use crate::infrastructure::payments::verify_stripe_webhook;
use crate::shared::error::AppError;
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

const STRIPE_SIGNATURE: &str = "stripe-signature";

/// `GET /escrows/{id}`
pub async fn get_escrow(
    State(state): State<AppState>,
    actor: Actor,
    Path(escrow_id): Path<String>,
) -> Result<Json<EscrowResponse>, AppError> {
    let escrow_id = parse_id(&escrow_id, "escrow")?;
    let escrow = state.escrow_service().get_escrow(actor, escrow_id).await?;
    Ok(Json(escrow.into()))
}

/// `POST /escrows/{id}/fund`
pub async fn fund(
    State(state): State<AppState>,
    actor: Actor,
    Path(escrow_id): Path<String>,
) -> Result<Json<FundingResponse>, AppError> {
    let escrow_id = parse_id(&escrow_id, "escrow")?;
    let result = state.escrow_service().fund(actor, escrow_id).await?;
    Ok(Json(result.into()))
}

/// `POST /webhooks/stripe`
///
/// The body must be the exact bytes Stripe signed, so it is taken raw.
#[tracing::instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let secret = state
        .settings
        .payments
        .stripe_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Webhooks are not configured".into()))?;

    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Stripe-Signature header".into()))?;

    let event = verify_stripe_webhook(
        &body,
        signature,
        secret,
        state.settings.payments.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )?;

    tracing::info!(?event, "Stripe webhook accepted");
    state.escrow_service().handle_payment_event(event).await?;

    Ok(Json(json!({ "received": true })))
}
