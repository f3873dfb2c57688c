//! Realtime events and the notifier that persists and pushes them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Escrow, Message, Notification, NotificationKind, NotificationRepository, ServiceOrder,
};
use crate::shared::snowflake::SnowflakeGenerator;

/// Payload dispatched to connected sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RealtimeEvent {
    NotificationCreate(Notification),
    MessageCreate(Message),
    OrderUpdate(ServiceOrder),
    EscrowUpdate(Escrow),
}

impl RealtimeEvent {
    /// Dispatch name sent in the `t` field.
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::NotificationCreate(_) => "NOTIFICATION_CREATE",
            RealtimeEvent::MessageCreate(_) => "MESSAGE_CREATE",
            RealtimeEvent::OrderUpdate(_) => "ORDER_UPDATE",
            RealtimeEvent::EscrowUpdate(_) => "ESCROW_UPDATE",
        }
    }
}

/// An event together with the users it is addressed to. This is the unit
/// carried over the Redis channel between instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub recipients: Vec<i64>,
    pub event: RealtimeEvent,
}

/// Delivers realtime events to users' live connections.
///
/// Delivery is best effort: implementations log failures instead of
/// returning them, since no business operation should fail because a socket
/// push did.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope);
}

/// Persists notifications and pushes them, plus other realtime events, to
/// the affected users.
#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
    publisher: Arc<dyn EventPublisher>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl Notifier {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        publisher: Arc<dyn EventPublisher>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            repo,
            publisher,
            id_generator,
        }
    }

    /// Store a notification for `user_id` and push it to their sockets.
    pub async fn notify(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        link: Option<String>,
    ) {
        let notification = Notification::new(
            self.id_generator.generate(),
            user_id,
            kind,
            title,
            body,
            link,
        );

        match self.repo.create(&notification).await {
            Ok(stored) => {
                self.publisher
                    .publish(EventEnvelope {
                        recipients: vec![user_id],
                        event: RealtimeEvent::NotificationCreate(stored),
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(user_id, kind = %kind, error = %e, "Failed to store notification");
            }
        }
    }

    /// Push an event without storing a notification.
    pub async fn push(&self, recipients: Vec<i64>, event: RealtimeEvent) {
        if recipients.is_empty() {
            return;
        }
        self.publisher
            .publish(EventEnvelope { recipients, event })
            .await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::MockNotificationRepository;

    /// A notifier that accepts everything and records nothing.
    pub fn silent_notifier() -> Notifier {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create().returning(|n| Ok(n.clone()));
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().returning(|_| ());
        Notifier::new(
            Arc::new(repo),
            Arc::new(publisher),
            Arc::new(SnowflakeGenerator::new(1, 1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockNotificationRepository;
    use crate::shared::error::AppError;

    #[test]
    fn test_event_wire_format() {
        let msg = Message::new(1, 2, 3, "hi".into());
        let json = serde_json::to_value(RealtimeEvent::MessageCreate(msg)).unwrap();
        assert_eq!(json["t"], "MESSAGE_CREATE");
        assert_eq!(json["d"]["content"], "hi");
    }

    #[tokio::test]
    async fn test_notify_pushes_stored_notification() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create().times(1).returning(|n| Ok(n.clone()));
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|env| {
                env.recipients == vec![7]
                    && matches!(env.event, RealtimeEvent::NotificationCreate(_))
            })
            .times(1)
            .returning(|_| ());

        let notifier = Notifier::new(
            Arc::new(repo),
            Arc::new(publisher),
            Arc::new(SnowflakeGenerator::new(1, 1)),
        );
        notifier
            .notify(7, NotificationKind::OrderUpdate, "Order", "Delivered", None)
            .await;
    }

    #[tokio::test]
    async fn test_notify_swallows_storage_errors() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .returning(|_| Err(AppError::Internal("db down".into())));
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let notifier = Notifier::new(
            Arc::new(repo),
            Arc::new(publisher),
            Arc::new(SnowflakeGenerator::new(1, 1)),
        );
        notifier
            .notify(7, NotificationKind::AccountUpdate, "t", "b", None)
            .await;
    }
}
