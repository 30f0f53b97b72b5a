use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info};
use uuid::Uuid;

// ── Push Message ──────────────────────────────────────────────

/// A push notification addressed to one device token.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// Device token registered by the mobile client.
    pub to: String,
    pub title: String,
    pub body: String,
    /// Flat string map; mobile clients route on `type` and `notificationId`.
    pub data: BTreeMap<String, String>,
    /// "high" for high/urgent notifications, otherwise "normal".
    pub priority: &'static str,
}

/// Delivery collaborator for the push fallback. Delivery guarantees beyond a
/// single attempt belong to the provider.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<()>;
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ── HTTP Push Gateway ─────────────────────────────────────────

/// Posts push messages to a push gateway over HTTP.
/// - HMAC-SHA256 signing (x-matchnotify-signature header) when a secret is configured
/// - one attempt, 10 s timeout; non-2xx is an error
#[derive(Clone)]
pub struct HttpPushSender {
    client: reqwest::Client,
    url: String,
    signing_secret: Option<String>,
}

impl HttpPushSender {
    pub fn new(url: String, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("MatchNotify-Push/1.0")
            .build()?;
        Ok(Self {
            client,
            url,
            signing_secret,
        })
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| anyhow::anyhow!("push serialize error: {}", e))?;
        let delivery_id = Uuid::new_v4().to_string();

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-matchnotify-delivery-id", &delivery_id);

        if let Some(secret) = &self.signing_secret {
            req = req.header("x-matchnotify-signature", hmac_sha256_hex(secret, &payload));
        }

        let resp = req.body(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("push gateway returned error: status={}, body={}", status, body);
        }

        info!(
            user_id = %message.user_id,
            delivery_id = %delivery_id,
            status = %status,
            "push notification handed to gateway"
        );
        Ok(())
    }
}

// ── Disabled ──────────────────────────────────────────────────

/// Used when no push gateway is configured.
#[derive(Clone, Default)]
pub struct NoopPushSender;

#[async_trait]
impl PushSender for NoopPushSender {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        debug!(user_id = %message.user_id, "No push gateway configured, skipping push");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────
