//! Realtime Hub
//!
//! Process-local registry of identified sockets. Events addressed to a user
//! are fanned out to every session that user has open on this instance.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::application::dto::response::{
    EscrowResponse, MessageResponse, NotificationResponse, OrderResponse,
};
use crate::application::events::{EventEnvelope, EventPublisher, RealtimeEvent};
use crate::infrastructure::metrics;

/// An event rendered for the wire, before sequencing.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub name: &'static str,
    pub payload: serde_json::Value,
}

impl From<RealtimeEvent> for Dispatch {
    fn from(event: RealtimeEvent) -> Self {
        let name = event.name();
        let payload = match event {
            RealtimeEvent::NotificationCreate(n) => {
                serde_json::to_value(NotificationResponse::from(n))
            }
            RealtimeEvent::MessageCreate(m) => serde_json::to_value(MessageResponse::from(m)),
            RealtimeEvent::OrderUpdate(o) => serde_json::to_value(OrderResponse::from(o)),
            RealtimeEvent::EscrowUpdate(e) => serde_json::to_value(EscrowResponse::from(e)),
        };
        Self {
            name,
            payload: payload.unwrap_or_default(),
        }
    }
}

struct ConnectedSession {
    user_id: i64,
    sender: mpsc::UnboundedSender<Dispatch>,
}

/// Maps users to their live sessions.
pub struct Hub {
    /// session_id -> session
    sessions: DashMap<String, ConnectedSession>,
    /// user_id -> session ids
    user_sessions: DashMap<i64, Vec<String>>,
    heartbeat_interval_ms: u64,
}

impl Hub {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            heartbeat_interval_ms,
        }
    }

    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    pub fn register_session(
        &self,
        session_id: String,
        user_id: i64,
        sender: mpsc::UnboundedSender<Dispatch>,
    ) {
        self.sessions
            .insert(session_id.clone(), ConnectedSession { user_id, sender });
        self.user_sessions
            .entry(user_id)
            .or_default()
            .push(session_id.clone());
        metrics::set_websocket_sessions(self.sessions.len());

        tracing::info!(user_id, session_id = %session_id, "Session registered");
    }

    pub fn unregister_session(&self, session_id: &str) {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return;
        };

        if let Some(mut ids) = self.user_sessions.get_mut(&session.user_id) {
            ids.retain(|s| s != session_id);
        }
        self.user_sessions
            .remove_if(&session.user_id, |_, ids| ids.is_empty());
        metrics::set_websocket_sessions(self.sessions.len());

        tracing::info!(
            user_id = session.user_id,
            session_id = %session_id,
            "Session unregistered"
        );
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.user_sessions
            .get(&user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// Push an event to every local session of its recipients. Returns the
    /// number of sessions reached.
    pub fn deliver(&self, envelope: EventEnvelope) -> usize {
        let EventEnvelope { recipients, event } = envelope;
        let dispatch = Dispatch::from(event);

        let mut delivered = 0;
        for user_id in recipients {
            let Some(ids) = self.user_sessions.get(&user_id).map(|ids| ids.clone()) else {
                continue;
            };
            for session_id in ids {
                let sent = self
                    .sessions
                    .get(&session_id)
                    .map(|s| s.sender.send(dispatch.clone()).is_ok())
                    .unwrap_or(false);
                if sent {
                    delivered += 1;
                } else {
                    tracing::debug!(session_id = %session_id, "Dropping event for closed session");
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl EventPublisher for Hub {
    async fn publish(&self, envelope: EventEnvelope) {
        let name = envelope.event.name();
        let delivered = self.deliver(envelope);
        tracing::trace!(event = name, delivered, "Delivered locally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, Notification, NotificationKind};
    use pretty_assertions::assert_eq;

    fn message_event() -> RealtimeEvent {
        RealtimeEvent::MessageCreate(Message::new(10, 20, 1, "hello".into()))
    }

    #[test]
    fn test_deliver_reaches_all_sessions_of_recipient() {
        let hub = Hub::new(45000);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();
        hub.register_session("a".into(), 2, tx_a);
        hub.register_session("b".into(), 2, tx_b);
        hub.register_session("c".into(), 3, tx_other);

        let delivered = hub.deliver(EventEnvelope {
            recipients: vec![2],
            event: message_event(),
        });

        assert_eq!(delivered, 2);
        let dispatch = rx_a.try_recv().unwrap();
        assert_eq!(dispatch.name, "MESSAGE_CREATE");
        assert_eq!(dispatch.payload["id"], "10");
        assert_eq!(dispatch.payload["content"], "hello");
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_unregister_forgets_user() {
        let hub = Hub::new(45000);
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register_session("a".into(), 2, tx);
        assert!(hub.is_online(2));

        hub.unregister_session("a");
        assert!(!hub.is_online(2));
        assert_eq!(hub.session_count(), 0);
        assert_eq!(
            hub.deliver(EventEnvelope {
                recipients: vec![2],
                event: message_event(),
            }),
            0
        );
    }

    #[test]
    fn test_closed_session_is_skipped() {
        let hub = Hub::new(45000);
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register_session("a".into(), 2, tx);
        drop(rx);

        assert_eq!(
            hub.deliver(EventEnvelope {
                recipients: vec![2],
                event: message_event(),
            }),
            0
        );
    }

    #[test]
    fn test_notification_payload_uses_response_shape() {
        let n = Notification::new(5, 2, NotificationKind::OrderUpdate, "Order", "Delivered", None);
        let dispatch = Dispatch::from(RealtimeEvent::NotificationCreate(n));
        assert_eq!(dispatch.name, "NOTIFICATION_CREATE");
        assert_eq!(dispatch.payload["id"], "5");
        assert_eq!(dispatch.payload["read"], false);
    }
}
