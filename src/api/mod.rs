use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};

use crate::AppState;

pub mod handlers;

/// Build the inbox API router (user-facing, JWT bearer auth per handler).
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread-count",
            get(handlers::count_unread_notifications),
        )
        .route(
            "/notifications/read-all",
            put(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            put(handlers::mark_notification_read),
        )
        .route("/notifications/:id", delete(handlers::delete_notification))
        .route(
            "/push-token",
            put(handlers::register_push_token).delete(handlers::remove_push_token),
        )
        .fallback(fallback_404)
}

/// Build the internal router used by the platform's own services to raise
/// notifications. The caller mounts this under `/internal`.
pub fn internal_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(handlers::publish_event))
        .route("/notifications", post(handlers::create_notification))
        .layer(middleware::from_fn_with_state(state, admin_auth))
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Admin-Key` (or `Authorization: Bearer`) against the
/// configured admin key. Returns 401 if missing/invalid, 500 if no key is configured.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let expected = state.config.admin_key.as_deref().ok_or_else(|| {
        tracing::error!("MATCHNOTIFY_ADMIN_KEY is not set; internal API disabled");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(k) => {
            // Never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("internal API: invalid key (provided: '{}')", masked);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("internal API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
