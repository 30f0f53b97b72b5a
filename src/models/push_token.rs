use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mobile push token registered for a user. One per user; the latest
/// registration replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct PushToken {
    pub user_id: Uuid,
    pub token: String,
    pub platform: Option<String>, // "ios" | "android" | "web"
    pub updated_at: DateTime<Utc>,
}
