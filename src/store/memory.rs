//! In-process notification store.
//!
//! Backs `serve --ephemeral` and the test suites. Same visibility rules as
//! the Postgres store: expired records are invisible to reads and removed by
//! `purge_expired`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::NotificationStore;
use crate::models::notification::{ListQuery, NewNotification, Notification};
use crate::models::push_token::PushToken;

#[derive(Clone)]
struct Entry {
    seq: u64,
    notification: Notification,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    notifications: Arc<DashMap<Uuid, Entry>>,
    push_tokens: Arc<DashMap<Uuid, PushToken>>,
    seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    fn visible(&self, user_id: Uuid, now: DateTime<Utc>) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .notifications
            .iter()
            .filter(|e| e.notification.user_id == user_id && !e.notification.is_expired(now))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            b.notification
                .created_at
                .cmp(&a.notification.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, new: &NewNotification) -> anyhow::Result<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            r#type: new.r#type,
            title: new.title.clone(),
            message: new.message.clone(),
            data: new.data.clone(),
            is_read: false,
            read_at: None,
            priority: new.priority,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.notifications.insert(
            notification.id,
            Entry {
                seq,
                notification: notification.clone(),
            },
        );
        Ok(notification)
    }

    async fn get_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Notification>> {
        let now = Utc::now();
        Ok(self
            .notifications
            .get(&id)
            .map(|e| e.notification.clone())
            .filter(|n| n.user_id == user_id && !n.is_expired(now)))
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &ListQuery,
    ) -> anyhow::Result<Vec<Notification>> {
        Ok(self
            .visible(user_id, Utc::now())
            .into_iter()
            .map(|e| e.notification)
            .filter(|n| !query.unread_only || !n.is_read)
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    async fn count_unread(&self, user_id: Uuid) -> anyhow::Result<i64> {
        Ok(self
            .visible(user_id, Utc::now())
            .iter()
            .filter(|e| !e.notification.is_read)
            .count() as i64)
    }

    async fn mark_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Notification>> {
        let now = Utc::now();
        let Some(mut entry) = self.notifications.get_mut(&id) else {
            return Ok(None);
        };
        let n = &mut entry.notification;
        if n.user_id != user_id || n.is_expired(now) {
            return Ok(None);
        }
        n.is_read = true;
        n.read_at = Some(at);
        n.updated_at = now;
        Ok(Some(n.clone()))
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<u64> {
        let now = Utc::now();
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            let n = &mut entry.notification;
            if n.user_id == user_id && !n.is_read && !n.is_expired(now) {
                n.is_read = true;
                n.read_at = Some(at);
                n.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .notifications
            .remove_if(&id, |_, e| e.notification.user_id == user_id)
            .is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let before = self.notifications.len();
        self.notifications
            .retain(|_, e| !e.notification.is_expired(now));
        Ok((before - self.notifications.len()) as u64)
    }

    async fn get_push_token(&self, user_id: Uuid) -> anyhow::Result<Option<PushToken>> {
        Ok(self.push_tokens.get(&user_id).map(|t| t.value().clone()))
    }

    async fn upsert_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> anyhow::Result<()> {
        self.push_tokens.insert(
            user_id,
            PushToken {
                user_id,
                token: token.to_string(),
                platform: platform.map(String::from),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_push_token(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.push_tokens.remove(&user_id).is_some())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
