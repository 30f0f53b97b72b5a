//! matchnotify: notification subsystem for the matchmaking platform.
//!
//! The binary in `main.rs` wires these modules together; integration tests in
//! `tests/` build the same router over in-memory components.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod realtime;
pub mod store;

use auth::JwtAuth;
use notification::NotificationService;
use realtime::SessionRegistry;
use store::NotificationStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub registry: SessionRegistry,
    pub notifications: NotificationService,
    pub auth: JwtAuth,
    pub config: config::Config,
}

/// Assemble the full HTTP surface: ops endpoints, `/ws`, the inbox API and
/// the internal API, wrapped in the shared middleware stack.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(realtime::socket::ws_handler))
        .nest("/api/v1", api::api_router())
        .nest("/internal", api::internal_router(state.clone()))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let allowed_origin = allowed_origin.to_string();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == allowed_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        // NOTE: AllowHeaders::any() is rejected together with allow_credentials(true)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-admin-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
}

/// Ready once the store answers.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with service logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    // Inbox responses are per-user
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.remove(header::SERVER);

    resp
}
