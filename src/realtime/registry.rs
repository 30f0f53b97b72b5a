//! Connected-session registry.
//!
//! Tracks live WebSocket connections, which user each one authenticated as,
//! and room membership. Two indexes are kept in step:
//! - `connections`: connection id → outbound sender, user, joined rooms
//! - `users`: user id → newest connection id (last write wins)
//!
//! Unregistering a connection only clears the user mapping when it still
//! points at that connection, so a stale disconnect never evicts a newer tab.
//!
//! Guards are never held across two maps.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::ServerEvent;

pub type ConnectionId = Uuid;
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    sender: EventSender,
    user_id: Option<Uuid>,
    rooms: HashSet<String>,
}

/// Namespace of per-user inbox rooms. Clients never address these rooms
/// directly; membership comes only from `register`.
pub const USER_ROOM_PREFIX: &str = "user:";

/// Name of the room every authenticated connection of `user_id` joins.
pub fn user_room(user_id: Uuid) -> String {
    format!("{}{}", USER_ROOM_PREFIX, user_id)
}

/// True for room ids inside the inbox namespace.
pub fn is_user_room(room: &str) -> bool {
    room.starts_with(USER_ROOM_PREFIX)
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    connections: Arc<DashMap<ConnectionId, Connection>>,
    users: Arc<DashMap<Uuid, ConnectionId>>,
    rooms: Arc<DashMap<String, HashSet<ConnectionId>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly upgraded, not yet authenticated connection.
    pub fn connect(&self, sender: EventSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection {
                sender,
                user_id: None,
                rooms: HashSet::new(),
            },
        );
        id
    }

    /// Bind `connection_id` to `user_id` and join it to the user's room.
    ///
    /// Overwrites any existing mapping for `user_id`. Returns false when the
    /// connection is unknown (already disconnected).
    pub fn register(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let previous_user = {
            let Some(mut conn) = self.connections.get_mut(&connection_id) else {
                return false;
            };
            conn.user_id.replace(user_id)
        };

        // Re-authentication as someone else: drop the old identity first.
        if let Some(prev) = previous_user.filter(|p| *p != user_id) {
            self.users.remove_if(&prev, |_, c| *c == connection_id);
            self.leave(connection_id, &user_room(prev));
        }

        if let Some(replaced) = self.users.insert(user_id, connection_id) {
            if replaced != connection_id {
                tracing::debug!(
                    user_id = %user_id,
                    replaced = %replaced,
                    connection_id = %connection_id,
                    "newer connection took over user mapping"
                );
            }
        }
        self.join(connection_id, &user_room(user_id));
        true
    }

    /// Forget a connection. Returns the user it was authenticated as, if any.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let (_, conn) = self.connections.remove(&connection_id)?;

        for room in &conn.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&connection_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }

        if let Some(user_id) = conn.user_id {
            self.users.remove_if(&user_id, |_, c| *c == connection_id);
        }
        conn.user_id
    }

    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.users.get(&user_id).map(|c| *c)
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.connections.get(&connection_id).and_then(|c| c.user_id)
    }

    pub fn join(&self, connection_id: ConnectionId, room: &str) -> bool {
        let inserted = match self.connections.get_mut(&connection_id) {
            Some(mut conn) => conn.rooms.insert(room.to_string()),
            None => return false,
        };
        if inserted {
            self.rooms
                .entry(room.to_string())
                .or_default()
                .insert(connection_id);
        }
        true
    }

    pub fn leave(&self, connection_id: ConnectionId, room: &str) -> bool {
        let removed = self
            .connections
            .get_mut(&connection_id)
            .map(|mut conn| conn.rooms.remove(room))
            .unwrap_or(false);
        if removed {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&connection_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        removed
    }

    pub fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Queue an event on one connection. False when the connection is gone
    /// or its writer has shut down.
    pub fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&connection_id) {
            Some(conn) => conn.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Queue an event on every member of `room` except `except`. Returns the
    /// number of connections it was queued on.
    pub fn broadcast_to_room(
        &self,
        room: &str,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        self.room_members(room)
            .into_iter()
            .filter(|id| Some(*id) != except)
            .filter(|id| self.send_to_connection(*id, event.clone()))
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(registry: &SessionRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.connect(tx), rx)
    }

    #[test]
    fn test_register_then_lookup() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let (c1, _rx) = open(&registry);

        assert!(registry.lookup(user).is_none());
        assert!(registry.register(user, c1));
        assert_eq!(registry.lookup(user), Some(c1));
        assert_eq!(registry.user_of(c1), Some(user));
        assert_eq!(registry.room_members(&user_room(user)), vec![c1]);
    }

    #[test]
    fn test_last_registration_wins_and_stale_unregister_is_noop() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let (c1, _rx1) = open(&registry);
        let (c2, _rx2) = open(&registry);

        registry.register(user, c1);
        registry.register(user, c2);
        assert_eq!(registry.lookup(user), Some(c2));

        // Disconnect of the older tab must not evict the newer mapping
        assert_eq!(registry.unregister(c1), Some(user));
        assert_eq!(registry.lookup(user), Some(c2));

        registry.unregister(c2);
        assert!(registry.lookup(user).is_none());
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.room_members(&user_room(user)).is_empty());
    }

    #[test]
    fn test_both_tabs_stay_in_user_room() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let (c1, _rx1) = open(&registry);
        let (c2, _rx2) = open(&registry);
        registry.register(user, c1);
        registry.register(user, c2);

        let mut members = registry.room_members(&user_room(user));
        members.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(members, expected);
        assert_eq!(registry.connected_user_count(), 1);
    }

    #[test]
    fn test_user_rooms_are_namespaced() {
        let user = Uuid::new_v4();
        let room = user_room(user);
        assert_eq!(room, format!("user:{}", user));
        assert!(is_user_room(&room));
        // A bare id is an ordinary chat room, not the user's inbox
        assert!(!is_user_room(&user.to_string()));
        assert!(!is_user_room("chat-1"));
    }

    #[test]
    fn test_register_unknown_connection_fails() {
        let registry = SessionRegistry::new();
        assert!(!registry.register(Uuid::new_v4(), Uuid::new_v4()));
    }

    #[test]
    fn test_reauthenticate_as_other_user_moves_identity() {
        let registry = SessionRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (c1, _rx) = open(&registry);

        registry.register(alice, c1);
        registry.register(bob, c1);

        assert!(registry.lookup(alice).is_none());
        assert_eq!(registry.lookup(bob), Some(c1));
        assert!(registry.room_members(&user_room(alice)).is_empty());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let registry = SessionRegistry::new();
        let (c1, mut rx1) = open(&registry);
        let (c2, mut rx2) = open(&registry);
        registry.join(c1, "chat-1");
        registry.join(c2, "chat-1");

        let sent = registry.broadcast_to_room("chat-1", &ServerEvent::Pong, Some(c1));
        assert_eq!(sent, 1);
        assert_eq!(rx2.try_recv().unwrap(), ServerEvent::Pong);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_leave_and_empty_room_cleanup() {
        let registry = SessionRegistry::new();
        let (c1, _rx) = open(&registry);
        registry.join(c1, "chat-9");
        assert!(registry.leave(c1, "chat-9"));
        assert!(!registry.leave(c1, "chat-9"));
        assert!(registry.room_members("chat-9").is_empty());
    }

    #[test]
    fn test_send_to_closed_receiver_reports_failure() {
        let registry = SessionRegistry::new();
        let (c1, rx) = open(&registry);
        drop(rx);
        assert!(!registry.send_to_connection(c1, ServerEvent::Pong));
    }
}
