//! WebSocket wire events.
//!
//! Every frame is a JSON text frame shaped `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::NotificationPayload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub room_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: String,
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Bearer token, with or without the `Bearer ` prefix.
    #[serde(rename = "authenticate")]
    Authenticate(String),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "joinRoom")]
    JoinRoom(RoomPayload),
    #[serde(rename = "leaveRoom")]
    LeaveRoom(RoomPayload),
    #[serde(rename = "ping")]
    Ping,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "authenticated", rename_all = "camelCase")]
    Authenticated { user_id: Uuid },
    #[serde(rename = "authentication_error")]
    AuthenticationError { message: String },
    #[serde(rename = "notification")]
    Notification(NotificationPayload),
    #[serde(rename = "userTyping", rename_all = "camelCase")]
    UserTyping {
        user_id: Uuid,
        room_id: String,
        is_typing: bool,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::AuthenticationError { .. } => "authentication_error",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::UserTyping { .. } => "userTyping",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}
