//! Redis Pub/Sub Fan-out
//!
//! With Redis configured every instance publishes realtime events to one
//! channel and every instance (the publisher included) subscribes to it,
//! handing each envelope to its local hub. Users connected to any instance
//! therefore see events produced on any other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::task::JoinHandle;

use crate::application::events::{EventEnvelope, EventPublisher};
use crate::infrastructure::metrics;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Publishes envelopes to the shared Redis channel.
#[derive(Clone)]
pub struct RedisEventPublisher {
    conn: ConnectionManager,
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, envelope: EventEnvelope) {
        let name = envelope.event.name();
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event = name, error = %e, "Failed to serialize realtime event");
                return;
            }
        };

        let mut conn = self.conn.clone();
        match conn.publish::<_, _, i64>(&self.channel, payload).await {
            Ok(receivers) => {
                metrics::record_marketplace_event(name);
                tracing::trace!(event = name, receivers, "Realtime event published");
            }
            Err(e) => {
                tracing::warn!(event = name, error = %e, "Failed to publish realtime event");
            }
        }
    }
}

/// Subscribe to `channel` and hand every envelope to `local`. Reconnects
/// after connection loss until the task is aborted.
pub fn spawn_subscriber(
    client: redis::Client,
    channel: String,
    local: Arc<dyn EventPublisher>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match subscribe_once(&client, &channel, local.as_ref()).await {
                Ok(()) => tracing::warn!(channel = %channel, "Realtime subscription ended"),
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "Realtime subscription failed")
                }
            }
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    })
}

async fn subscribe_once(
    client: &redis::Client,
    channel: &str,
    local: &dyn EventPublisher,
) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    tracing::info!(channel, "Subscribed to realtime channel");

    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable realtime payload");
                continue;
            }
        };
        match serde_json::from_str::<EventEnvelope>(&payload) {
            Ok(envelope) => local.publish(envelope).await,
            Err(e) => tracing::warn!(error = %e, "Malformed realtime envelope"),
        }
    }
    Ok(())
}
