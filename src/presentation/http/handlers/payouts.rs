//! Wallet and Payout Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    CompletePayoutRequest, FailPayoutRequest, PayoutRequest, PayoutStatusQuery,
};
use crate::application::dto::response::{PayoutResponse, WalletResponse};
use crate::application::services::PayoutService;
use crate::application::Actor;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /wallet`: available balance plus the ledger, newest first.
pub async fn wallet(
    State(state): State<AppState>,
    actor: Actor,
    Query(page): Query<PageQuery>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = state.payout_service().wallet(actor, page.into()).await?;
    Ok(Json(wallet.into()))
}

/// `GET /payouts/mine`
pub async fn my_payouts(
    State(state): State<AppState>,
    actor: Actor,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<PayoutResponse>>, AppError> {
    let payouts = state.payout_service().my_payouts(actor, page.into()).await?;
    Ok(Json(payouts.map(Into::into)))
}

/// `POST /payouts`
pub async fn request_payout(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<PayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), AppError> {
    let payout = state
        .payout_service()
        .request_payout(actor, body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(payout.into())))
}

/// `GET /admin/payouts?status=`
pub async fn list_payouts(
    State(state): State<AppState>,
    Query(filter): Query<PayoutStatusQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<PayoutResponse>>, AppError> {
    let payouts = state
        .payout_service()
        .list_payouts(filter.status, page.into())
        .await?;
    Ok(Json(payouts.map(Into::into)))
}

/// `POST /admin/payouts/{id}/process`
pub async fn process_payout(
    State(state): State<AppState>,
    admin: Actor,
    Path(payout_id): Path<String>,
) -> Result<Json<PayoutResponse>, AppError> {
    let payout_id = parse_id(&payout_id, "payout")?;
    let payout = state.payout_service().process(admin, payout_id).await?;
    Ok(Json(payout.into()))
}

/// `POST /admin/payouts/{id}/complete`
pub async fn complete_payout(
    State(state): State<AppState>,
    admin: Actor,
    Path(payout_id): Path<String>,
    ValidatedJson(body): ValidatedJson<CompletePayoutRequest>,
) -> Result<Json<PayoutResponse>, AppError> {
    let payout_id = parse_id(&payout_id, "payout")?;
    let payout = state
        .payout_service()
        .complete(admin, payout_id, Some(body.reference))
        .await?;
    Ok(Json(payout.into()))
}

/// `POST /admin/payouts/{id}/fail`
pub async fn fail_payout(
    State(state): State<AppState>,
    admin: Actor,
    Path(payout_id): Path<String>,
    ValidatedJson(body): ValidatedJson<FailPayoutRequest>,
) -> Result<Json<PayoutResponse>, AppError> {
    let payout_id = parse_id(&payout_id, "payout")?;
    let payout = state
        .payout_service()
        .fail(admin, payout_id, body.reason)
        .await?;
    Ok(Json(payout.into()))
}
