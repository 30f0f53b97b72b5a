//! WebSocket endpoint.
//!
//! Route: GET /ws
//!
//! Per connection:
//!   1. The socket is tracked in the registry unauthenticated
//!   2. The client must send `authenticate` with its bearer token within the
//!      configured timeout; failure sends `authentication_error` and closes
//!   3. On success the connection is registered for the user and joins the
//!      user's room; the socket is trusted for the rest of its life
//!   4. `typing`, `joinRoom`, `leaveRoom` and `ping` are served until close
//!   5. On close the connection is unregistered
//!
//! Outbound events are written by a dedicated task draining the
//! connection's channel, so fan-out never waits on a slow socket.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{ClientEvent, ServerEvent};
use super::registry::{is_user_room, ConnectionId};
use crate::metrics::METRICS;
use crate::AppState;

/// GET /ws
pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = state.registry.connect(tx.clone());
    METRICS.connections.inc();
    tracing::debug!(connection_id = %connection_id, "socket connected");

    // ── Writer ────────────────────────────────────────────────
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(event = event.name(), "failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // ── Reader ────────────────────────────────────────────────
    let auth_deadline =
        tokio::time::Instant::now() + Duration::from_secs(state.config.auth_timeout_secs);
    let mut user: Option<Uuid> = None;

    loop {
        let next = if user.is_none() {
            match tokio::time::timeout_at(auth_deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    METRICS.socket_auth_total.with_label_values(&["timeout"]).inc();
                    tracing::debug!(connection_id = %connection_id, "socket did not authenticate in time");
                    let _ = tx.send(ServerEvent::AuthenticationError {
                        message: "authentication timeout".into(),
                    });
                    break;
                }
            }
        } else {
            stream.next().await
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, "socket read error: {}", e);
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = tx.send(ServerEvent::error(format!("malformed event: {}", e)));
                        continue;
                    }
                };
                if handle_event(&state, connection_id, &mut user, event, &tx).is_break() {
                    break;
                }
            }
            Message::Close(_) => break,
            // Ping/pong frames are answered by axum; binary frames are not part of the protocol
            _ => {}
        }
    }

    // ── Disconnect ────────────────────────────────────────────
    state.registry.unregister(connection_id);
    METRICS.connections.dec();
    drop(tx);
    let _ = writer.await;

    tracing::debug!(
        connection_id = %connection_id,
        user_id = ?user,
        "socket disconnected"
    );
}

fn handle_event(
    state: &AppState,
    connection_id: ConnectionId,
    user: &mut Option<Uuid>,
    event: ClientEvent,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> ControlFlow<()> {
    let registry = &state.registry;

    let event = match event {
        ClientEvent::Authenticate(token) => {
            return authenticate(state, connection_id, user, &token, tx);
        }
        ClientEvent::Ping => {
            let _ = tx.send(ServerEvent::Pong);
            return ControlFlow::Continue(());
        }
        other => other,
    };

    let Some(user_id) = *user else {
        let _ = tx.send(ServerEvent::error("not authenticated"));
        return ControlFlow::Continue(());
    };

    let target_room = match &event {
        ClientEvent::Typing(typing) => Some(typing.room_id.as_str()),
        ClientEvent::JoinRoom(room) | ClientEvent::LeaveRoom(room) => Some(room.room_id.as_str()),
        ClientEvent::Authenticate(_) | ClientEvent::Ping => None,
    };
    if let Some(room) = target_room.filter(|room| is_user_room(room)) {
        tracing::warn!(
            connection_id = %connection_id,
            user_id = %user_id,
            room = %room,
            "refused client event addressing an inbox room"
        );
        let _ = tx.send(ServerEvent::error("room is reserved"));
        return ControlFlow::Continue(());
    }

    match event {
        ClientEvent::Typing(typing) => {
            registry.broadcast_to_room(
                &typing.room_id,
                &ServerEvent::UserTyping {
                    user_id,
                    room_id: typing.room_id.clone(),
                    is_typing: typing.is_typing,
                },
                Some(connection_id),
            );
        }
        ClientEvent::JoinRoom(room) => {
            registry.join(connection_id, &room.room_id);
            tracing::debug!(user_id = %user_id, room = %room.room_id, "joined room");
        }
        ClientEvent::LeaveRoom(room) => {
            registry.leave(connection_id, &room.room_id);
            tracing::debug!(user_id = %user_id, room = %room.room_id, "left room");
        }
        ClientEvent::Authenticate(_) | ClientEvent::Ping => {}
    }
    ControlFlow::Continue(())
}

/// Verify the token and register the connection. A rejected token ends the
/// connection; the client has to reconnect to try again.
fn authenticate(
    state: &AppState,
    connection_id: ConnectionId,
    user: &mut Option<Uuid>,
    token: &str,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> ControlFlow<()> {
    match state.auth.verify(token) {
        Ok(claims) => {
            state.registry.register(claims.sub, connection_id);
            *user = Some(claims.sub);
            METRICS.socket_auth_total.with_label_values(&["ok"]).inc();
            tracing::info!(
                connection_id = %connection_id,
                user_id = %claims.sub,
                "socket authenticated"
            );
            let _ = tx.send(ServerEvent::Authenticated { user_id: claims.sub });
            ControlFlow::Continue(())
        }
        Err(e) => {
            METRICS.socket_auth_total.with_label_values(&["rejected"]).inc();
            tracing::warn!(connection_id = %connection_id, "socket authentication failed: {}", e);
            let _ = tx.send(ServerEvent::AuthenticationError {
                message: "authentication failed".into(),
            });
            ControlFlow::Break(())
        }
    }
}
