//! Service Order Handlers
//!
//! Placing an order opens an escrow the buyer funds before the seller
//! accepts. The remaining routes are single status transitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{DeliverOrderRequest, OrderRoleQuery, PlaceOrderRequest};
use crate::application::dto::response::{OrderResponse, PlacedOrderResponse};
use crate::application::services::OrderService;
use crate::application::Actor;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `POST /services/{id}/orders`
pub async fn place_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(service_id): Path<String>,
    ValidatedJson(body): ValidatedJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrderResponse>), AppError> {
    let service_id = parse_id(&service_id, "service")?;
    let (order, escrow) = state
        .order_service()
        .place_order(actor, service_id, body.tier, body.requirements)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PlacedOrderResponse {
            order: order.into(),
            escrow: escrow.into(),
        }),
    ))
}

/// `GET /orders/mine?role=buyer|seller`
pub async fn my_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(role): Query<OrderRoleQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<OrderResponse>>, AppError> {
    let orders = state
        .order_service()
        .my_orders(actor, role.role, page.into())
        .await?;
    Ok(Json(orders.map(Into::into)))
}

/// `GET /orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = parse_id(&order_id, "order")?;
    let order = state.order_service().get_order(actor, order_id).await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{id}/deliver`
pub async fn deliver(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<String>,
    ValidatedJson(body): ValidatedJson<DeliverOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order_id = parse_id(&order_id, "order")?;
    let order = state
        .order_service()
        .deliver(actor, order_id, body.note)
        .await?;
    Ok(Json(order.into()))
}

macro_rules! order_transition {
    ($(#[$doc:meta])* $name:ident => $method:ident) => {
        $(#[$doc])*
        pub async fn $name(
            State(state): State<AppState>,
            actor: Actor,
            Path(order_id): Path<String>,
        ) -> Result<Json<OrderResponse>, AppError> {
            let order_id = parse_id(&order_id, "order")?;
            let order = state.order_service().$method(actor, order_id).await?;
            Ok(Json(order.into()))
        }
    };
}

order_transition!(
    /// `POST /orders/{id}/accept`
    accept => accept
);
order_transition!(
    /// `POST /orders/{id}/start`
    start => start
);
order_transition!(
    /// `POST /orders/{id}/revision`
    request_revision => request_revision
);
order_transition!(
    /// `POST /orders/{id}/complete`
    complete => complete
);
order_transition!(
    /// `POST /orders/{id}/cancel`
    cancel => cancel
);
order_transition!(
    /// `POST /orders/{id}/dispute`
    dispute => dispute
);
