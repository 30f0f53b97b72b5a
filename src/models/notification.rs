use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Enumerations ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    MarriageRequest,
    Message,
    ProfileView,
    Match,
    GuardianApproval,
    Verification,
    System,
}

impl NotificationType {
    pub const ALL: [NotificationType; 7] = [
        NotificationType::MarriageRequest,
        NotificationType::Message,
        NotificationType::ProfileView,
        NotificationType::Match,
        NotificationType::GuardianApproval,
        NotificationType::Verification,
        NotificationType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::MarriageRequest => "marriage_request",
            NotificationType::Message => "message",
            NotificationType::ProfileView => "profile_view",
            NotificationType::Match => "match",
            NotificationType::GuardianApproval => "guardian_approval",
            NotificationType::Verification => "verification",
            NotificationType::System => "system",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown notification type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(anyhow::anyhow!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestResponse {
    Accepted,
    Rejected,
}

// ── Typed payload ────────────────────────────────────────────

/// Structured payload of a notification, one variant per `NotificationType`.
///
/// Storage keeps only the inner object (no tag); the type column says which
/// variant it is. Use [`NotificationData::to_stored`] and
/// [`NotificationData::from_stored`] at the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationData {
    #[serde(rename_all = "camelCase")]
    MarriageRequest {
        request_id: Uuid,
        sender_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<RequestResponse>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        chat_room_id: Uuid,
        sender_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    ProfileView { viewer_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Match {
        match_user_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    GuardianApproval {
        request_id: Uuid,
        requester_id: Uuid,
        ward_id: Uuid,
    },
    Verification { status: String },
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
}

impl NotificationData {
    pub fn kind(&self) -> NotificationType {
        match self {
            NotificationData::MarriageRequest { .. } => NotificationType::MarriageRequest,
            NotificationData::Message { .. } => NotificationType::Message,
            NotificationData::ProfileView { .. } => NotificationType::ProfileView,
            NotificationData::Match { .. } => NotificationType::Match,
            NotificationData::GuardianApproval { .. } => NotificationType::GuardianApproval,
            NotificationData::Verification { .. } => NotificationType::Verification,
            NotificationData::System { .. } => NotificationType::System,
        }
    }

    /// The untagged object persisted in the `data` column.
    pub fn to_stored(&self) -> serde_json::Value {
        let mut tagged = serde_json::to_value(self).unwrap_or_default();
        tagged
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or_else(|| serde_json::json!({}))
    }

    /// Validate a stored bag against the notification type it was filed under.
    pub fn from_stored(kind: NotificationType, value: &serde_json::Value) -> anyhow::Result<Self> {
        let tagged = serde_json::json!({ "type": kind.as_str(), "data": value });
        serde_json::from_value(tagged)
            .map_err(|e| anyhow::anyhow!("data does not match type '{}': {}", kind, e))
    }
}

// ── Records ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub r#type: NotificationType, // 'type' is a reserved keyword
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn typed_data(&self) -> Option<anyhow::Result<NotificationData>> {
        self.data
            .as_ref()
            .map(|v| NotificationData::from_stored(self.r#type, v))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Client-facing shape delivered over the realtime channel.
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            id: self.id,
            user_id: self.user_id,
            r#type: self.r#type,
            title: self.title.clone(),
            message: self.message.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
            data: self.data.clone(),
            priority: self.priority,
        }
    }

    /// Flat string map handed to the push provider.
    pub fn push_data(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(serde_json::Value::Object(fields)) = &self.data {
            for (k, v) in fields {
                let s = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                map.insert(k.clone(), s);
            }
        }
        map.insert("notificationId".to_string(), self.id.to_string());
        map.insert("type".to_string(), self.r#type.to_string());
        map.insert("priority".to_string(), self.priority.to_string());
        map
    }
}

/// Input to the creation routine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: Uuid,
    pub r#type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        r#type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            r#type,
            title: title.into(),
            message: message.into(),
            data: None,
            priority: Priority::default(),
            expires_at: None,
        }
    }

    pub fn typed(
        user_id: Uuid,
        data: NotificationData,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut n = Self::new(user_id, data.kind(), title, message);
        n.data = Some(data.to_stored());
        n
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub r#type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub data: Option<serde_json::Value>,
    pub priority: Priority,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default, alias = "unreadOnly")]
    pub unread_only: bool,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            unread_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trips_through_str() {
        for t in NotificationType::ALL {
            assert_eq!(t.as_str().parse::<NotificationType>().unwrap(), t);
        }
        assert!("friend_request".parse::<NotificationType>().is_err());
    }

    #[test]
    fn test_type_serializes_snake_case() {
        let v = serde_json::to_value(NotificationType::GuardianApproval).unwrap();
        assert_eq!(v, "guardian_approval");
    }

    #[test]
    fn test_priority_default_is_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert!(Priority::Urgent > Priority::High);
    }

    #[test]
    fn test_stored_data_is_untagged_camel_case() {
        let request_id = Uuid::new_v4();
        let sender_id = Uuid::new_v4();
        let data = NotificationData::MarriageRequest {
            request_id,
            sender_id,
            response: None,
        };
        let stored = data.to_stored();
        assert_eq!(stored["requestId"], request_id.to_string());
        assert_eq!(stored["senderId"], sender_id.to_string());
        assert!(stored.get("type").is_none());
        assert!(stored.get("response").is_none());
    }

    #[test]
    fn test_from_stored_validates_against_type() {
        let chat_room_id = Uuid::new_v4();
        let stored = NotificationData::Message {
            chat_room_id,
            sender_id: Uuid::new_v4(),
            message_id: None,
        }
        .to_stored();

        let parsed = NotificationData::from_stored(NotificationType::Message, &stored).unwrap();
        assert_eq!(parsed.kind(), NotificationType::Message);

        // Message payload filed under marriage_request is rejected
        assert!(NotificationData::from_stored(NotificationType::MarriageRequest, &stored).is_err());
    }

    #[test]
    fn test_system_data_allows_empty_bag() {
        let parsed =
            NotificationData::from_stored(NotificationType::System, &serde_json::json!({})).unwrap();
        assert_eq!(parsed, NotificationData::System { link: None });
    }

    #[test]
    fn test_list_query_clamps() {
        let q = ListQuery {
            limit: Some(10_000),
            offset: Some(-4),
            unread_only: false,
        };
        assert_eq!(q.limit(), ListQuery::MAX_LIMIT);
        assert_eq!(q.offset(), 0);
        assert_eq!(ListQuery::default().limit(), 20);
    }

    #[test]
    fn test_push_data_merges_fields() {
        let now = Utc::now();
        let request_id = Uuid::new_v4();
        let n = Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            r#type: NotificationType::MarriageRequest,
            title: "t".into(),
            message: "m".into(),
            data: Some(serde_json::json!({ "requestId": request_id.to_string(), "nested": {} })),
            is_read: false,
            read_at: None,
            priority: Priority::High,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        let map = n.push_data();
        assert_eq!(map["requestId"], request_id.to_string());
        assert_eq!(map["type"], "marriage_request");
        assert_eq!(map["priority"], "high");
        assert!(!map.contains_key("nested"));
    }
}
