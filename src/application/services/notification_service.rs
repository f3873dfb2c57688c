//! Notification Service

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::Actor;
use crate::domain::{Notification, NotificationRepository};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn list(
        &self,
        actor: Actor,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>, AppError>;

    async fn unread_count(&self, actor: Actor) -> Result<i64, AppError>;

    async fn mark_read(&self, actor: Actor, notification_id: i64) -> Result<Notification, AppError>;

    async fn mark_all_read(&self, actor: Actor) -> Result<u64, AppError>;
}

pub struct NotificationServiceImpl<N>
where
    N: NotificationRepository,
{
    notification_repo: Arc<N>,
}

impl<N> NotificationServiceImpl<N>
where
    N: NotificationRepository,
{
    pub fn new(notification_repo: Arc<N>) -> Self {
        Self { notification_repo }
    }
}

#[async_trait]
impl<N> NotificationService for NotificationServiceImpl<N>
where
    N: NotificationRepository + 'static,
{
    async fn list(
        &self,
        actor: Actor,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>, AppError> {
        let (items, total) = self
            .notification_repo
            .list_for_user(actor.user_id, unread_only, page)
            .await?;
        Ok(Page::new(items, page, total))
    }

    async fn unread_count(&self, actor: Actor) -> Result<i64, AppError> {
        self.notification_repo.unread_count(actor.user_id).await
    }

    async fn mark_read(&self, actor: Actor, notification_id: i64) -> Result<Notification, AppError> {
        self.notification_repo
            .mark_read(notification_id, actor.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".into()))
    }

    async fn mark_all_read(&self, actor: Actor) -> Result<u64, AppError> {
        self.notification_repo.mark_all_read(actor.user_id).await
    }
}
