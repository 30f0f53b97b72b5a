pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::notification::{ListQuery, NewNotification, Notification};
use crate::models::push_token::PushToken;

/// Abstraction over the notification record store.
/// Implementations: PgStore (Postgres, production), MemoryStore (tests, ephemeral mode).
///
/// Reads never return records whose `expires_at` has passed, whether or not
/// the expiry sweeper has deleted them yet.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new unread record and return it.
    async fn insert_notification(&self, new: &NewNotification) -> anyhow::Result<Notification>;

    async fn get_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Notification>>;

    /// Newest first.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &ListQuery,
    ) -> anyhow::Result<Vec<Notification>>;

    async fn count_unread(&self, user_id: Uuid) -> anyhow::Result<i64>;

    /// Sets `is_read` and overwrites `read_at` with `at`. `None` when the
    /// record does not exist in this user's inbox.
    async fn mark_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Notification>>;

    /// Returns the number of records that transitioned to read.
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;

    /// Delete records whose `expires_at` is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn get_push_token(&self, user_id: Uuid) -> anyhow::Result<Option<PushToken>>;

    async fn upsert_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn delete_push_token(&self, user_id: Uuid) -> anyhow::Result<bool>;

    /// Liveness check behind `/readyz`.
    async fn ping(&self) -> anyhow::Result<()>;
}
