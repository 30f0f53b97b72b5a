use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::notification::{ListQuery, NewNotification, Notification, NotificationData};
use crate::notification::DomainEvent;
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
    pub platform: Option<String>,
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid id: {}", raw)))
}

// ── Inbox Handlers ───────────────────────────────────────────

/// GET /api/v1/notifications, newest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifs = state.notifications.list(user_id, &params).await?;
    Ok(Json(notifs))
}

/// GET /api/v1/notifications/unread-count
pub async fn count_unread_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.notifications.unread_count(user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// PUT /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id_str): Path<String>,
) -> Result<Json<Notification>, AppError> {
    let id = parse_id(&id_str)?;
    let notification = state
        .notifications
        .mark_read(id, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(notification))
}

/// PUT /api/v1/notifications/read-all
pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.notifications.mark_all_read(user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// DELETE /api/v1/notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id_str)?;
    if state.notifications.delete(id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// PUT /api/v1/push-token: register (or replace) the caller's device token
pub async fn register_push_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<PushTokenRequest>,
) -> Result<StatusCode, AppError> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("token must not be empty".into()));
    }
    state
        .notifications
        .register_push_token(user_id, token, payload.platform.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/push-token
pub async fn remove_push_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, AppError> {
    state.notifications.remove_push_token(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Internal Handlers ────────────────────────────────────────

/// POST /internal/events: raise a domain event through its factory
pub async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<DomainEvent>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = state.notifications.notify(event).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// POST /internal/notifications: raw creation for callers outside the factory set
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewNotification>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    if new.title.trim().is_empty() || new.message.trim().is_empty() {
        return Err(AppError::BadRequest("title and message are required".into()));
    }
    if let Some(data) = &new.data {
        NotificationData::from_stored(new.r#type, data)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }
    let notification = state.notifications.create(new).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
