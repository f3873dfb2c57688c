//! In-app notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    pub enum NotificationKind {
        ApplicationReceived => "application_received",
        ApplicationAccepted => "application_accepted",
        ApplicationRejected => "application_rejected",
        OrderUpdate => "order_update",
        EscrowUpdate => "escrow_update",
        PayoutUpdate => "payout_update",
        NewMessage => "new_message",
        ReviewReceived => "review_received",
        AccountUpdate => "account_update",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Client-side route, e.g. `/orders/123`
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        id: i64,
        user_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            title: title.into(),
            body: body.into(),
            link,
            read_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<Notification, AppError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, i64), AppError>;

    async fn unread_count(&self, user_id: i64) -> Result<i64, AppError>;

    /// Returns `None` if the notification does not exist or belongs to
    /// someone else.
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<Option<Notification>, AppError>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64, AppError>;
}
