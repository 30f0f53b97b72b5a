//! Notification creation and inbox operations.
//!
//! `create` is the single path through which every domain event becomes a
//! notification: persist, then real-time fan-out, then push fallback. Only
//! the persist step can fail the call; delivery problems are logged and
//! dropped because the stored record is what clients recover from.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::factory::DomainEvent;
use super::push::{PushMessage, PushSender};
use crate::metrics::METRICS;
use crate::models::notification::{ListQuery, NewNotification, Notification, Priority};
use crate::realtime::fanout::Fanout;
use crate::store::NotificationStore;

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    fanout: Arc<dyn Fanout>,
    push: Arc<dyn PushSender>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        fanout: Arc<dyn Fanout>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        Self {
            store,
            fanout,
            push,
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Persist and deliver a notification.
    pub async fn create(&self, new: NewNotification) -> anyhow::Result<Notification> {
        let (notification, _push) = self.create_inner(new).await?;
        Ok(notification)
    }

    /// Like `create`, but returns only after the push attempt has finished.
    /// Used by one-shot CLI commands that would otherwise exit first.
    pub async fn create_and_flush(&self, new: NewNotification) -> anyhow::Result<Notification> {
        let (notification, push) = self.create_inner(new).await?;
        if let Err(e) = push.await {
            tracing::warn!(notification_id = %notification.id, "push task aborted: {}", e);
        }
        Ok(notification)
    }

    async fn create_inner(
        &self,
        new: NewNotification,
    ) -> anyhow::Result<(Notification, JoinHandle<()>)> {
        let notification = self.store.insert_notification(&new).await?;
        METRICS
            .created_total
            .with_label_values(&[notification.r#type.as_str()])
            .inc();

        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.r#type,
            priority = %notification.priority,
            "notification created"
        );

        let payload = notification.payload();
        match self.fanout.emit(notification.user_id, &payload).await {
            Ok(0) => {
                METRICS.realtime_total.with_label_values(&["offline"]).inc();
                tracing::debug!(user_id = %notification.user_id, "recipient offline, no realtime delivery");
            }
            Ok(_) => METRICS.realtime_total.with_label_values(&["delivered"]).inc(),
            Err(e) => {
                METRICS.realtime_total.with_label_values(&["error"]).inc();
                tracing::warn!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    error = %e,
                    "realtime delivery failed"
                );
            }
        }

        let push = self.dispatch_push(&notification);
        Ok((notification, push))
    }

    /// Turn a domain event into a notification via its factory, then `create` it.
    pub async fn notify(&self, event: DomainEvent) -> anyhow::Result<Notification> {
        self.create(event.into_notification()).await
    }

    /// Fire-and-forget push to the recipient's registered device, if any.
    fn dispatch_push(&self, notification: &Notification) -> JoinHandle<()> {
        let store = self.store.clone();
        let push = self.push.clone();
        let user_id = notification.user_id;
        let notification_id = notification.id;
        let title = notification.title.clone();
        let body = notification.message.clone();
        let data = notification.push_data();
        let priority = match notification.priority {
            Priority::High | Priority::Urgent => "high",
            Priority::Low | Priority::Medium => "normal",
        };

        tokio::spawn(async move {
            let token = match store.get_push_token(user_id).await {
                Ok(Some(token)) => token,
                Ok(None) => {
                    METRICS.push_total.with_label_values(&["no_token"]).inc();
                    return;
                }
                Err(e) => {
                    METRICS.push_total.with_label_values(&["failed"]).inc();
                    tracing::warn!(user_id = %user_id, error = %e, "push token lookup failed");
                    return;
                }
            };

            let message = PushMessage {
                user_id,
                to: token.token,
                title,
                body,
                data,
                priority,
            };
            match push.send(&message).await {
                Ok(()) => METRICS.push_total.with_label_values(&["sent"]).inc(),
                Err(e) => {
                    METRICS.push_total.with_label_values(&["failed"]).inc();
                    tracing::warn!(
                        notification_id = %notification_id,
                        user_id = %user_id,
                        error = %e,
                        "push dispatch failed"
                    );
                }
            }
        })
    }

    // -- Inbox --

    pub async fn list(&self, user_id: Uuid, query: &ListQuery) -> anyhow::Result<Vec<Notification>> {
        self.store.list_notifications(user_id, query).await
    }

    pub async fn unread_count(&self, user_id: Uuid) -> anyhow::Result<i64> {
        self.store.count_unread(user_id).await
    }

    /// Idempotent; a second call only refreshes `read_at`. Expiry is untouched.
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Notification>> {
        self.store.mark_read(id, user_id, Utc::now()).await
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> anyhow::Result<u64> {
        self.store.mark_all_read(user_id, Utc::now()).await
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        self.store.delete_notification(id, user_id).await
    }

    pub async fn register_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> anyhow::Result<()> {
        self.store.upsert_push_token(user_id, token, platform).await?;
        tracing::info!(user_id = %user_id, platform = ?platform, "push token registered");
        Ok(())
    }

    pub async fn remove_push_token(&self, user_id: Uuid) -> anyhow::Result<bool> {
        self.store.delete_push_token(user_id).await
    }
}
