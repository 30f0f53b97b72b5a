//! Real-time fan-out of notification payloads.
//!
//! Delivery is best-effort: events are queued on each live connection's
//! outbound channel with no acknowledgement, retry, or offline queue. The
//! persisted record is what a client re-fetches after a missed event.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::protocol::ServerEvent;
use super::registry::{user_room, SessionRegistry};
use crate::models::notification::NotificationPayload;

#[async_trait]
pub trait Fanout: Send + Sync {
    /// Push `payload` to the user's live connections on this process.
    /// Returns how many local connections it was queued on.
    async fn emit(&self, user_id: Uuid, payload: &NotificationPayload) -> anyhow::Result<usize>;
}

// ── Local (single process) ───────────────────────────────────

#[derive(Clone)]
pub struct LocalFanout {
    registry: SessionRegistry,
}

impl LocalFanout {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Room broadcast to every connection of the user plus a direct send to
    /// the connection the registry maps the user to. A connection reached by
    /// both paths receives the event once.
    pub fn deliver(&self, user_id: Uuid, payload: &NotificationPayload) -> usize {
        let mut targets = self.registry.room_members(&user_room(user_id));
        if let Some(direct) = self.registry.lookup(user_id) {
            if !targets.contains(&direct) {
                targets.push(direct);
            }
        }

        let event = ServerEvent::Notification(payload.clone());
        let delivered = targets
            .into_iter()
            .filter(|id| self.registry.send_to_connection(*id, event.clone()))
            .count();

        tracing::debug!(
            user_id = %user_id,
            notification_id = %payload.id,
            connections = delivered,
            "realtime fan-out"
        );
        delivered
    }
}

#[async_trait]
impl Fanout for LocalFanout {
    async fn emit(&self, user_id: Uuid, payload: &NotificationPayload) -> anyhow::Result<usize> {
        Ok(self.deliver(user_id, payload))
    }
}

// ── Redis pub/sub bridge (multi process) ─────────────────────

/// Envelope published on the shared channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutEnvelope {
    /// Process that published the envelope; it already delivered locally.
    pub origin: Uuid,
    pub user_id: Uuid,
    pub payload: NotificationPayload,
}

/// Delivers locally, then publishes so processes holding the user's other
/// sockets can deliver too. Each process runs [`spawn_subscriber`].
#[derive(Clone)]
pub struct RedisFanout {
    local: LocalFanout,
    redis: ConnectionManager,
    channel: String,
    origin: Uuid,
}

impl RedisFanout {
    pub fn new(local: LocalFanout, redis: ConnectionManager, channel: String, origin: Uuid) -> Self {
        Self {
            local,
            redis,
            channel,
            origin,
        }
    }
}

#[async_trait]
impl Fanout for RedisFanout {
    async fn emit(&self, user_id: Uuid, payload: &NotificationPayload) -> anyhow::Result<usize> {
        let delivered = self.local.deliver(user_id, payload);

        let envelope = FanoutEnvelope {
            origin: self.origin,
            user_id,
            payload: payload.clone(),
        };
        let body = serde_json::to_string(&envelope)?;
        let mut conn = self.redis.clone();
        conn.publish::<_, _, ()>(&self.channel, body).await?;

        Ok(delivered)
    }
}

/// Spawn the task that delivers envelopes published by other processes.
/// Reconnects with a fixed back-off when the subscription drops.
pub fn spawn_subscriber(client: redis::Client, channel: String, origin: Uuid, local: LocalFanout) {
    tokio::spawn(async move {
        loop {
            match subscribe(&client, &channel, origin, &local).await {
                Ok(()) => tracing::warn!(channel = %channel, "fan-out subscription closed, reconnecting"),
                Err(e) => tracing::error!(channel = %channel, "fan-out subscription failed: {}", e),
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
}

async fn subscribe(
    client: &redis::Client,
    channel: &str,
    origin: Uuid,
    local: &LocalFanout,
) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.subscribe(channel).await?;
    tracing::info!(channel = %channel, "subscribed to fan-out channel");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let raw: String = match msg.get_payload() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("unreadable fan-out message: {}", e);
                continue;
            }
        };
        if let Some(envelope) = accept_envelope(&raw, origin) {
            local.deliver(envelope.user_id, &envelope.payload);
        }
    }
    Ok(())
}

/// Parse an envelope, discarding our own publications and malformed input.
fn accept_envelope(raw: &str, origin: Uuid) -> Option<FanoutEnvelope> {
    match serde_json::from_str::<FanoutEnvelope>(raw) {
        Ok(envelope) if envelope.origin == origin => None,
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!("malformed fan-out envelope: {}", e);
            None
        }
    }
}
