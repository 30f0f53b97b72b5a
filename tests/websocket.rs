//! WebSocket protocol tests against a live server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use matchnotify::auth::JwtAuth;
use matchnotify::config::Config;
use matchnotify::notification::factory;
use matchnotify::notification::push::NoopPushSender;
use matchnotify::notification::NotificationService;
use matchnotify::realtime::fanout::LocalFanout;
use matchnotify::realtime::SessionRegistry;
use matchnotify::store::memory::MemoryStore;
use matchnotify::{build_router, AppState};

const SECRET: &str = "ws-test-secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(auth_timeout_secs: u64) -> (SocketAddr, Arc<AppState>) {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();
    let notifications = NotificationService::new(
        store.clone(),
        Arc::new(LocalFanout::new(registry.clone())),
        Arc::new(NoopPushSender),
    );
    let state = Arc::new(AppState {
        store,
        registry,
        notifications,
        auth: JwtAuth::new(SECRET),
        config: Config {
            jwt_secret: SECRET.into(),
            auth_timeout_secs,
            ..Config::default()
        },
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn open(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    socket
}

async fn emit(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next JSON event, or None once the server has closed the socket.
async fn next_event(socket: &mut Socket) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame");
        match msg {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn authenticated(addr: SocketAddr, user: Uuid) -> Socket {
    let mut socket = open(addr).await;
    let token = JwtAuth::new(SECRET).issue(user, 600).unwrap();
    emit(
        &mut socket,
        json!({ "event": "authenticate", "data": format!("Bearer {}", token) }),
    )
    .await;
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "authenticated");
    assert_eq!(event["data"]["userId"], user.to_string());
    socket
}

/// Round-trip a ping so earlier frames on this socket are known processed.
async fn sync(socket: &mut Socket) {
    emit(socket, json!({ "event": "ping" })).await;
    let event = next_event(socket).await.unwrap();
    assert_eq!(event["event"], "pong");
}

#[tokio::test]
async fn test_authenticated_socket_receives_notification() {
    let (addr, state) = spawn_server(30).await;
    let user = Uuid::new_v4();
    let mut socket = authenticated(addr, user).await;
    assert_eq!(state.registry.connected_user_count(), 1);

    let request_id = Uuid::new_v4();
    let created = state
        .notifications
        .create(factory::marriage_request_received(
            user,
            Uuid::new_v4(),
            "Ayesha",
            request_id,
        ))
        .await
        .unwrap();

    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "notification");
    assert_eq!(event["data"]["id"], created.id.to_string());
    assert_eq!(event["data"]["type"], "marriage_request");
    assert_eq!(event["data"]["priority"], "high");
    assert_eq!(event["data"]["data"]["requestId"], request_id.to_string());
}

#[tokio::test]
async fn test_bad_token_rejected_and_closed() {
    let (addr, state) = spawn_server(30).await;
    let mut socket = open(addr).await;

    emit(
        &mut socket,
        json!({ "event": "authenticate", "data": "Bearer forged.token.value" }),
    )
    .await;
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "authentication_error");
    assert!(next_event(&mut socket).await.is_none(), "server closes the socket");

    // The registry forgets the connection once the handler unwinds
    for _ in 0..50 {
        if state.registry.connection_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_auth_timeout_closes_socket() {
    let (addr, _state) = spawn_server(1).await;
    let mut socket = open(addr).await;

    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "authentication_error");
    assert!(next_event(&mut socket).await.is_none());
}

#[tokio::test]
async fn test_events_before_authentication_are_refused() {
    let (addr, _state) = spawn_server(30).await;
    let mut socket = open(addr).await;

    emit(
        &mut socket,
        json!({ "event": "joinRoom", "data": { "roomId": "chat-1" } }),
    )
    .await;
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "error");

    // Ping is always answered
    sync(&mut socket).await;
}

#[tokio::test]
async fn test_malformed_frame_gets_error_not_disconnect() {
    let (addr, _state) = spawn_server(30).await;
    let mut socket = authenticated(addr, Uuid::new_v4()).await;

    socket
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    let event = next_event(&mut socket).await.unwrap();
    assert_eq!(event["event"], "error");
    sync(&mut socket).await;
}

#[tokio::test]
async fn test_typing_reaches_other_room_members_only() {
    let (addr, _state) = spawn_server(30).await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let mut alice_socket = authenticated(addr, alice).await;
    let mut bob_socket = authenticated(addr, bob).await;

    let join = json!({ "event": "joinRoom", "data": { "roomId": "chat-42" } });
    emit(&mut alice_socket, join.clone()).await;
    emit(&mut bob_socket, join).await;
    sync(&mut alice_socket).await;
    sync(&mut bob_socket).await;

    emit(
        &mut alice_socket,
        json!({ "event": "typing", "data": { "roomId": "chat-42", "isTyping": true } }),
    )
    .await;

    let event = next_event(&mut bob_socket).await.unwrap();
    assert_eq!(event["event"], "userTyping");
    assert_eq!(event["data"]["userId"], alice.to_string());
    assert_eq!(event["data"]["roomId"], "chat-42");
    assert_eq!(event["data"]["isTyping"], true);

    // Alice's next frame is her own pong, not an echo of her typing event
    sync(&mut alice_socket).await;

    emit(
        &mut bob_socket,
        json!({ "event": "leaveRoom", "data": { "roomId": "chat-42" } }),
    )
    .await;
    sync(&mut bob_socket).await;
    emit(
        &mut alice_socket,
        json!({ "event": "typing", "data": { "roomId": "chat-42", "isTyping": false } }),
    )
    .await;
    sync(&mut alice_socket).await;
    // Bob left; his next frame is his own pong
    sync(&mut bob_socket).await;
}

#[tokio::test]
async fn test_disconnect_unregisters_user() {
    let (addr, state) = spawn_server(30).await;
    let user = Uuid::new_v4();
    let mut socket = authenticated(addr, user).await;
    assert!(state.registry.lookup(user).is_some());

    socket.close(None).await.unwrap();
    for _ in 0..50 {
        if state.registry.lookup(user).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state.registry.lookup(user).is_none());
}

#[tokio::test]
async fn test_other_users_inbox_cannot_be_joined() {
    let (addr, state) = spawn_server(30).await;
    let victim = Uuid::new_v4();
    let mut victim_socket = authenticated(addr, victim).await;
    let mut other_socket = authenticated(addr, Uuid::new_v4()).await;

    // A bare user id is an ordinary room name
    emit(
        &mut other_socket,
        json!({ "event": "joinRoom", "data": { "roomId": victim.to_string() } }),
    )
    .await;
    sync(&mut other_socket).await;

    // The inbox namespace is refused outright
    for event in ["joinRoom", "leaveRoom"] {
        emit(
            &mut other_socket,
            json!({ "event": event, "data": { "roomId": format!("user:{}", victim) } }),
        )
        .await;
        let reply = next_event(&mut other_socket).await.unwrap();
        assert_eq!(reply["event"], "error");
    }
    emit(
        &mut other_socket,
        json!({
            "event": "typing",
            "data": { "roomId": format!("user:{}", victim), "isTyping": true }
        }),
    )
    .await;
    let reply = next_event(&mut other_socket).await.unwrap();
    assert_eq!(reply["event"], "error");

    state
        .notifications
        .create(factory::marriage_request_received(
            victim,
            Uuid::new_v4(),
            "Ayesha",
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    let event = next_event(&mut victim_socket).await.unwrap();
    assert_eq!(event["event"], "notification");
    assert_eq!(event["data"]["userId"], victim.to_string());
    // Neither a notification nor a typing event leaked: next frames are pongs
    sync(&mut victim_socket).await;
    sync(&mut other_socket).await;
}
