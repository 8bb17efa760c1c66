use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::connctx::{outbound_channel, ConnId, Connection, Delivery, Outbound, OutboundQueue};
use super::userctx::Identity;
use crate::models::SendMessage;

/// Key of a broadcast group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Workspace(String),
    Page(String),
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Workspace(id) => write!(f, "workspace:{}", id),
            RoomKey::Page(id) => write!(f, "page:{}", id),
        }
    }
}

struct ConnEntry {
    user_id: String,
    outbound: Outbound,
    rooms: HashSet<RoomKey>,
}

#[derive(Default)]
struct Rooms {
    connections: HashMap<ConnId, ConnEntry>,
    rooms: HashMap<RoomKey, HashSet<ConnId>>,
}

/// Point-in-time counts for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub rooms: usize,
    pub workspace_rooms: usize,
    pub page_rooms: usize,
}

/// Tracks live connections and the rooms they joined.
///
/// One mutex guards all membership; it is never held across an await and
/// message delivery happens after it is released.
pub struct RoomRegistry {
    inner: Mutex<Rooms>,
    queue_capacity: usize,
}

impl RoomRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Rooms::default()),
            queue_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        // Membership maps stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Promote a verified identity to a live connection
    pub fn register(&self, identity: Identity) -> (Connection, OutboundQueue) {
        let id: ConnId = Uuid::new_v4();
        let (outbound, queue) = outbound_channel(id, self.queue_capacity);
        self.lock().connections.insert(
            id,
            ConnEntry {
                user_id: identity.user_id.clone(),
                outbound: outbound.clone(),
                rooms: HashSet::new(),
            },
        );
        debug!("Registered connection {} for user {}", id, identity.user_id);
        (Connection::new(id, identity, outbound), queue)
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub fn join(&self, conn_id: ConnId, room: RoomKey) -> bool {
        let mut inner = self.lock();
        let Rooms { connections, rooms } = &mut *inner;
        let Some(entry) = connections.get_mut(&conn_id) else {
            error!("Join of {} by unknown connection {}", room, conn_id);
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        rooms.entry(room.clone()).or_default().insert(conn_id);
        debug!("Connection {} joined {}", conn_id, room);
        true
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub fn leave(&self, conn_id: ConnId, room: &RoomKey) -> bool {
        let mut inner = self.lock();
        let Rooms { connections, rooms } = &mut *inner;
        let was_member = connections
            .get_mut(&conn_id)
            .map_or(false, |entry| entry.rooms.remove(room));
        if was_member {
            remove_member(rooms, room, conn_id);
            debug!("Connection {} left {}", conn_id, room);
        }
        was_member
    }

    /// Deliver `msg` to every member of `room` except `excluding`.
    ///
    /// Returns how many members had it queued.
    pub fn broadcast(&self, room: &RoomKey, msg: &SendMessage, excluding: Option<ConnId>) -> usize {
        let recipients: Vec<Outbound> = {
            let inner = self.lock();
            match inner.rooms.get(room) {
                Some(members) => members
                    .iter()
                    .filter(|id| Some(**id) != excluding)
                    .filter_map(|id| inner.connections.get(id).map(|e| e.outbound.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        deliver_all(&recipients, msg)
    }

    /// Deliver `msg` to every live connection except `excluding`
    pub fn broadcast_all(&self, msg: &SendMessage, excluding: Option<ConnId>) -> usize {
        let recipients: Vec<Outbound> = {
            let inner = self.lock();
            inner
                .connections
                .iter()
                .filter(|(id, _)| Some(**id) != excluding)
                .map(|(_, e)| e.outbound.clone())
                .collect()
        };
        deliver_all(&recipients, msg)
    }

    /// Forget a connection and every room membership it holds.
    ///
    /// Returns the rooms it was removed from; empty for an unknown or
    /// already dropped connection.
    pub fn drop_connection(&self, conn_id: ConnId) -> Vec<RoomKey> {
        let mut inner = self.lock();
        let Rooms { connections, rooms } = &mut *inner;
        let Some(entry) = connections.remove(&conn_id) else {
            return Vec::new();
        };
        let left: Vec<RoomKey> = entry.rooms.into_iter().collect();
        for room in &left {
            remove_member(rooms, room, conn_id);
        }
        debug!(
            "Dropped connection {} of user {} from {} rooms",
            conn_id,
            entry.user_id,
            left.len()
        );
        left
    }

    /// Close every live connection; used on shutdown
    pub fn close_all(&self) -> usize {
        let inner = self.lock();
        for entry in inner.connections.values() {
            entry.outbound.close();
        }
        let n = inner.connections.len();
        info!("Closing {} live connections", n);
        n
    }

    pub fn has_room(&self, room: &RoomKey) -> bool {
        self.lock().rooms.contains_key(room)
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnId> {
        self.lock()
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, conn_id: ConnId) -> Vec<RoomKey> {
        self.lock()
            .connections
            .get(&conn_id)
            .map(|e| e.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, conn_id: ConnId) -> bool {
        self.lock().connections.contains_key(&conn_id)
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();
        let workspace_rooms = inner
            .rooms
            .keys()
            .filter(|k| matches!(k, RoomKey::Workspace(_)))
            .count();
        RegistryStats {
            connections: inner.connections.len(),
            rooms: inner.rooms.len(),
            workspace_rooms,
            page_rooms: inner.rooms.len() - workspace_rooms,
        }
    }
}

fn remove_member(rooms: &mut HashMap<RoomKey, HashSet<ConnId>>, room: &RoomKey, conn_id: ConnId) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(&conn_id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}

fn deliver_all(recipients: &[Outbound], msg: &SendMessage) -> usize {
    recipients
        .iter()
        .filter(|o| o.deliver(msg.clone()) == Delivery::Queued)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PongMessage, UserOfflineMessage};
    use crate::ws::userctx::UserCtx;

    fn identity(uid: &str) -> Identity {
        Identity::new(
            UserCtx {
                id: uid.to_string(),
                name: format!("User {uid}"),
                email: format!("{uid}@example.com"),
            },
            Vec::new(),
        )
    }

    fn pong(n: usize) -> SendMessage {
        SendMessage::Pong(PongMessage { date: n.to_string() })
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<SendMessage> {
        std::iter::from_fn(|| queue.try_recv()).collect()
    }

    #[test]
    fn join_is_idempotent() {
        let registry = RoomRegistry::new(8);
        let (a, _qa) = registry.register(identity("a"));
        let room = RoomKey::Workspace("w1".to_string());

        assert!(registry.join(a.id(), room.clone()));
        assert!(!registry.join(a.id(), room.clone()));
        assert_eq!(registry.members(&room), vec![a.id()]);
        assert_eq!(registry.rooms_of(a.id()), vec![room]);
    }

    #[test]
    fn leaving_last_member_removes_room() {
        let registry = RoomRegistry::new(8);
        let (a, _qa) = registry.register(identity("a"));
        let room = RoomKey::Workspace("w1".to_string());

        registry.join(a.id(), room.clone());
        assert!(registry.leave(a.id(), &room));
        assert!(!registry.has_room(&room));
        assert!(!registry.leave(a.id(), &room));
        assert_eq!(registry.stats().rooms, 0);
    }

    #[test]
    fn broadcast_skips_excluded_sender_and_reaches_others_once() {
        let registry = RoomRegistry::new(8);
        let (a, mut qa) = registry.register(identity("a"));
        let (b, mut qb) = registry.register(identity("b"));
        let (c, mut qc) = registry.register(identity("c"));
        let (_d, mut qd) = registry.register(identity("d"));
        let room = RoomKey::Page("p1".to_string());
        for conn in [&a, &b, &c] {
            registry.join(conn.id(), room.clone());
        }

        let delivered = registry.broadcast(&room, &pong(1), Some(a.id()));

        assert_eq!(delivered, 2);
        assert!(drain(&mut qa).is_empty());
        assert_eq!(drain(&mut qb), vec![pong(1)]);
        assert_eq!(drain(&mut qc), vec![pong(1)]);
        // not a member
        assert!(drain(&mut qd).is_empty());
    }

    #[test]
    fn broadcast_to_missing_room_is_a_no_op() {
        let registry = RoomRegistry::new(8);
        let delivered = registry.broadcast(&RoomKey::Page("nope".to_string()), &pong(1), None);
        assert_eq!(delivered, 0);
    }

    #[test]
    fn per_recipient_order_is_preserved() {
        let registry = RoomRegistry::new(16);
        let (a, _qa) = registry.register(identity("a"));
        let (b, mut qb) = registry.register(identity("b"));
        let room = RoomKey::Workspace("w1".to_string());
        registry.join(a.id(), room.clone());
        registry.join(b.id(), room.clone());

        for n in 0..10 {
            registry.broadcast(&room, &pong(n), Some(a.id()));
        }

        assert_eq!(drain(&mut qb), (0..10).map(pong).collect::<Vec<_>>());
    }

    #[test]
    fn drop_connection_leaves_every_room() {
        let registry = RoomRegistry::new(8);
        let (a, _qa) = registry.register(identity("a"));
        let (b, _qb) = registry.register(identity("b"));
        let r1 = RoomKey::Workspace("w1".to_string());
        let r2 = RoomKey::Page("p1".to_string());
        registry.join(a.id(), r1.clone());
        registry.join(a.id(), r2.clone());
        registry.join(b.id(), r1.clone());

        let mut left = registry.drop_connection(a.id());
        left.sort_by_key(|k| k.to_string());

        assert_eq!(left, vec![r2.clone(), r1.clone()]);
        assert!(!registry.is_connected(a.id()));
        assert_eq!(registry.members(&r1), vec![b.id()]);
        assert!(!registry.has_room(&r2));
    }

    #[test]
    fn drop_connection_without_rooms_is_safe_and_idempotent() {
        let registry = RoomRegistry::new(8);
        let (a, _qa) = registry.register(identity("a"));

        assert!(registry.drop_connection(a.id()).is_empty());
        assert!(registry.drop_connection(a.id()).is_empty());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn broadcast_all_reaches_everyone_but_the_excluded() {
        let registry = RoomRegistry::new(8);
        let (a, mut qa) = registry.register(identity("a"));
        let (_b, mut qb) = registry.register(identity("b"));
        let offline = SendMessage::UserOffline(UserOfflineMessage { user_id: "a".to_string() });

        assert_eq!(registry.broadcast_all(&offline, Some(a.id())), 1);
        assert!(drain(&mut qa).is_empty());
        assert_eq!(drain(&mut qb), vec![offline]);
    }

    #[test]
    fn slow_consumer_is_evicted_without_blocking_others() {
        let registry = RoomRegistry::new(2);
        let (a, _qa) = registry.register(identity("a"));
        let (_slow, slow_q) = {
            let (conn, q) = registry.register(identity("slow"));
            registry.join(conn.id(), RoomKey::Page("p1".to_string()));
            (conn, q)
        };
        let (fast, mut fast_q) = registry.register(identity("fast"));
        let room = RoomKey::Page("p1".to_string());
        registry.join(fast.id(), room.clone());

        for n in 0..3 {
            registry.broadcast(&room, &pong(n), Some(a.id()));
            // the fast consumer keeps up
            assert_eq!(fast_q.try_recv(), Some(pong(n)));
        }

        assert!(slow_q.is_evicted());
        assert!(!fast_q.is_evicted());
        assert!(fast_q.try_recv().is_none());
    }

    #[test]
    fn close_all_signals_every_connection() {
        let registry = RoomRegistry::new(8);
        let (_a, qa) = registry.register(identity("a"));
        let (_b, qb) = registry.register(identity("b"));

        assert_eq!(registry.close_all(), 2);
        assert!(qa.is_evicted());
        assert!(qb.is_evicted());
    }

    #[test]
    fn room_keys_render_with_scope_prefix() {
        assert_eq!(RoomKey::Workspace("w1".to_string()).to_string(), "workspace:w1");
        assert_eq!(RoomKey::Page("p1".to_string()).to_string(), "page:p1");
    }
}
