//! Notification Handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::application::dto::request::NotificationQuery;
use crate::application::dto::response::{CountResponse, NotificationResponse, UpdatedResponse};
use crate::application::services::NotificationService;
use crate::application::Actor;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageQuery};
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /notifications?unread=true`
pub async fn list_notifications(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<NotificationQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<NotificationResponse>>, AppError> {
    let notifications = state
        .notification_service()
        .list(actor, filter.unread, page.into())
        .await?;
    Ok(Json(notifications.map(Into::into)))
}

/// `GET /notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.notification_service().unread_count(actor).await?;
    Ok(Json(CountResponse { count }))
}

/// `POST /notifications/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    actor: Actor,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationResponse>, AppError> {
    let notification_id = parse_id(&notification_id, "notification")?;
    let notification = state
        .notification_service()
        .mark_read(actor, notification_id)
        .await?;
    Ok(Json(notification.into()))
}

/// `POST /notifications/read-all`
pub async fn mark_all_read(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<UpdatedResponse>, AppError> {
    let updated = state.notification_service().mark_all_read(actor).await?;
    Ok(Json(UpdatedResponse { updated }))
}
