//! Prometheus metrics for the notification pipeline.
//!
//! Registered once in the global default registry and exposed on `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge,
    TextEncoder,
};

pub struct Metrics {
    /// Notifications persisted, by type.
    pub created_total: IntCounterVec,
    /// Real-time fan-out outcomes: "delivered", "offline", "error".
    pub realtime_total: IntCounterVec,
    /// Push dispatch outcomes: "sent", "failed", "no_token".
    pub push_total: IntCounterVec,
    /// Socket authentication outcomes: "ok", "rejected", "timeout".
    pub socket_auth_total: IntCounterVec,
    /// Live WebSocket connections on this process.
    pub connections: IntGauge,
}

pub static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics {
    created_total: register_int_counter_vec!(
        opts!("matchnotify_notifications_created_total", "Notifications persisted"),
        &["type"]
    )
    .expect("failed to register matchnotify_notifications_created_total"),
    realtime_total: register_int_counter_vec!(
        opts!("matchnotify_realtime_total", "Real-time fan-out outcomes"),
        &["outcome"]
    )
    .expect("failed to register matchnotify_realtime_total"),
    push_total: register_int_counter_vec!(
        opts!("matchnotify_push_total", "Push dispatch outcomes"),
        &["outcome"]
    )
    .expect("failed to register matchnotify_push_total"),
    socket_auth_total: register_int_counter_vec!(
        opts!("matchnotify_socket_auth_total", "WebSocket authentication outcomes"),
        &["outcome"]
    )
    .expect("failed to register matchnotify_socket_auth_total"),
    connections: register_int_gauge!(opts!(
        "matchnotify_connections",
        "Live WebSocket connections"
    ))
    .expect("failed to register matchnotify_connections"),
});

/// Render all registered metrics in Prometheus text format.
pub fn render() -> String {
    Lazy::force(&METRICS);
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        METRICS.created_total.with_label_values(&["system"]).inc();
        let text = render();
        assert!(text.contains("matchnotify_notifications_created_total"));
        assert!(text.contains("matchnotify_connections"));
    }
}
