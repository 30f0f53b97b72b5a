use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::NotificationStore;
use crate::models::notification::{ListQuery, NewNotification, Notification};
use crate::models::push_token::PushToken;

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, title, message, data, is_read, read_at, priority, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    // -- Notification Operations --

    async fn insert_notification(&self, new: &NewNotification) -> anyhow::Result<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"INSERT INTO notifications (user_id, type, title, message, data, priority, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            NOTIFICATION_COLUMNS
        ))
        .bind(new.user_id)
        .bind(new.r#type.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.data)
        .bind(new.priority.as_str())
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {}
               FROM notifications
               WHERE id = $1 AND user_id = $2
                 AND (expires_at IS NULL OR expires_at > NOW())"#,
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Notification::try_from).transpose()
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        query: &ListQuery,
    ) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {}
               FROM notifications
               WHERE user_id = $1
                 AND (expires_at IS NULL OR expires_at > NOW())
                 AND ($2 = false OR is_read = false)
               ORDER BY created_at DESC
               LIMIT $3 OFFSET $4"#,
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(query.unread_only)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn count_unread(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM notifications
               WHERE user_id = $1 AND is_read = false
                 AND (expires_at IS NULL OR expires_at > NOW())"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"UPDATE notifications
               SET is_read = true, read_at = $3, updated_at = NOW()
               WHERE id = $1 AND user_id = $2
                 AND (expires_at IS NULL OR expires_at > NOW())
               RETURNING {}"#,
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Notification::try_from).transpose()
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications
               SET is_read = true, read_at = $2, updated_at = NOW()
               WHERE user_id = $1 AND is_read = false
                 AND (expires_at IS NULL OR expires_at > NOW())"#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -- Push Token Operations --

    async fn get_push_token(&self, user_id: Uuid) -> anyhow::Result<Option<PushToken>> {
        let row = sqlx::query_as::<_, PushToken>(
            "SELECT user_id, token, platform, updated_at FROM push_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO push_tokens (user_id, token, platform)
               VALUES ($1, $2, $3)
               ON CONFLICT (user_id)
               DO UPDATE SET token = EXCLUDED.token, platform = EXCLUDED.platform, updated_at = NOW()"#,
        )
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_push_token(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Raw row; `type` and `priority` are TEXT columns parsed on the way out.
#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub priority: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> anyhow::Result<Self> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            r#type: row.r#type.parse()?,
            title: row.title,
            message: row.message,
            data: row.data,
            is_read: row.is_read,
            read_at: row.read_at,
            priority: row.priority.parse()?,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{NotificationType, Priority};

    fn row(kind: &str, priority: &str) -> NotificationRow {
        let now = Utc::now();
        NotificationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            r#type: kind.to_string(),
            title: "New marriage request".to_string(),
            message: "Aisha sent you a marriage request".to_string(),
            data: None,
            is_read: false,
            read_at: None,
            priority: priority.to_string(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_converts_enums() {
        let n = Notification::try_from(row("marriage_request", "high")).unwrap();
        assert_eq!(n.r#type, NotificationType::MarriageRequest);
        assert_eq!(n.priority, Priority::High);
    }

    #[test]
    fn test_row_with_unknown_type_is_rejected() {
        assert!(Notification::try_from(row("wink", "high")).is_err());
        assert!(Notification::try_from(row("system", "critical")).is_err());
    }
}
