// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection registry, room membership and fan-out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use ringcast_core::{ConnectionId, FanoutEvent, RingcastError, Room, ServerFrame, UserId};

use crate::policy;

/// Snapshot of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    /// `None` until the connection authenticates.
    pub user_id: Option<UserId>,
    pub rooms: Vec<Room>,
    pub connected_at: DateTime<Utc>,
}

/// Counts reported by `/v1/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
}

struct ConnectionEntry {
    user_id: Option<UserId>,
    rooms: HashSet<Room>,
    tx: mpsc::Sender<ServerFrame>,
    connected_at: DateTime<Utc>,
}

impl ConnectionEntry {
    fn snapshot(&self, id: &ConnectionId) -> ConnectionSession {
        let mut rooms: Vec<Room> = self.rooms.iter().cloned().collect();
        rooms.sort();
        ConnectionSession {
            connection_id: id.clone(),
            user_id: self.user_id.clone(),
            rooms,
            connected_at: self.connected_at,
        }
    }
}

/// The server process's single owner of connections and rooms.
///
/// Lock order is always `connections` before `rooms`; room member lists are
/// copied out before any connection is touched during fan-out.
pub struct RoomHub {
    queue_capacity: usize,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
}

impl RoomHub {
    /// Create a hub whose connections buffer up to `queue_capacity` frames.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a new connection and join it to the global room.
    ///
    /// Returns the connection id and the receiving end of its outbound queue.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerFrame>) {
        let id = ConnectionId::new(uuid::Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut rooms = HashSet::new();
        rooms.insert(Room::Global);
        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                user_id: None,
                rooms,
                tx,
                connected_at: Utc::now(),
            },
        );
        self.rooms.entry(Room::Global).or_default().insert(id.clone());
        debug!(conn = %id, "connection registered");
        (id, rx)
    }

    /// Bind `conn` to `user` and join its personal room.
    ///
    /// Re-authenticating as the same user is a no-op; switching users is refused.
    pub fn authenticate(&self, conn: &ConnectionId, user: &UserId) -> Result<(), RingcastError> {
        {
            let mut entry = self
                .connections
                .get_mut(conn)
                .ok_or_else(|| unknown_connection(conn))?;
            match &entry.user_id {
                Some(existing) if existing == user => return Ok(()),
                Some(existing) => {
                    return Err(RingcastError::Auth(format!(
                        "connection already authenticated as {existing}"
                    )));
                }
                None => entry.user_id = Some(user.clone()),
            }
        }
        self.join(conn, &Room::User(user.clone()))?;
        info!(conn = %conn, user = %user, "connection authenticated");
        Ok(())
    }

    /// Join `conn` to `room`. Returns `false` if it was already a member.
    pub fn join(&self, conn: &ConnectionId, room: &Room) -> Result<bool, RingcastError> {
        let mut entry = self
            .connections
            .get_mut(conn)
            .ok_or_else(|| unknown_connection(conn))?;
        policy::authorize_join(entry.user_id.as_ref(), room)?;
        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }
        self.rooms.entry(room.clone()).or_default().insert(conn.clone());
        debug!(conn = %conn, room = %room, "joined room");
        Ok(true)
    }

    /// Remove `conn` from `room`. Returns `false` if it was not a member.
    pub fn leave(&self, conn: &ConnectionId, room: &Room) -> Result<bool, RingcastError> {
        let mut entry = self
            .connections
            .get_mut(conn)
            .ok_or_else(|| unknown_connection(conn))?;
        if !entry.rooms.remove(room) {
            return Ok(false);
        }
        self.remove_member(room, conn);
        debug!(conn = %conn, room = %room, "left room");
        Ok(true)
    }

    /// Drop `conn` and every membership it held.
    pub fn disconnect(&self, conn: &ConnectionId) -> Option<ConnectionSession> {
        let (id, entry) = self.connections.remove(conn)?;
        for room in &entry.rooms {
            self.remove_member(room, &id);
        }
        debug!(conn = %id, rooms = entry.rooms.len(), "connection dropped");
        Some(entry.snapshot(&id))
    }

    /// Deliver `event` to every connection currently in `room`.
    ///
    /// Returns how many connections accepted the frame.
    pub fn emit(&self, room: &Room, event: &FanoutEvent) -> usize {
        let members = self.members(room);
        let mut delivered = 0;
        for member in members {
            if self.deliver(&member, room, event) {
                delivered += 1;
            }
        }
        debug!(room = %room, kind = %event.event_type(), delivered, "event emitted");
        delivered
    }

    /// Emit a client event on behalf of `origin` after authorizing it.
    ///
    /// The server stamps `timestamp` and `origin`; client-supplied values are
    /// discarded. The payload, including a like's commit time, is forwarded
    /// as sent. The emitting connection itself receives the event too if it
    /// is a member of `room`.
    pub fn emit_from(
        &self,
        origin: &ConnectionId,
        room: &Room,
        mut event: FanoutEvent,
    ) -> Result<usize, RingcastError> {
        let user = self
            .connections
            .get(origin)
            .ok_or_else(|| unknown_connection(origin))?
            .user_id
            .clone();
        policy::authorize_emit(user.as_ref(), room, &event)?;
        event.timestamp = Utc::now();
        event.origin = Some(origin.clone());
        Ok(self.emit(room, &event))
    }

    /// Deliver `event` to every room it routes to, at most once per connection.
    pub fn publish(&self, event: &FanoutEvent, rooms: &[Room]) -> usize {
        let mut seen = HashSet::new();
        let mut delivered = 0;
        for room in rooms {
            for member in self.members(room) {
                if seen.insert(member.clone()) && self.deliver(&member, room, event) {
                    delivered += 1;
                }
            }
        }
        debug!(kind = %event.event_type(), rooms = rooms.len(), delivered, "event published");
        delivered
    }

    /// Queue a frame for one connection. Returns `false` if it was dropped.
    pub fn send(&self, conn: &ConnectionId, frame: ServerFrame) -> bool {
        let Some(entry) = self.connections.get(conn) else {
            return false;
        };
        match entry.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %conn, "outbound queue full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn session(&self, conn: &ConnectionId) -> Option<ConnectionSession> {
        self.connections.get(conn).map(|e| e.snapshot(conn))
    }

    /// Connections currently joined to `room`.
    pub fn members(&self, room: &Room) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
        }
    }

    fn deliver(&self, conn: &ConnectionId, room: &Room, event: &FanoutEvent) -> bool {
        self.send(
            conn,
            ServerFrame::Event {
                room: room.clone(),
                event: event.clone(),
            },
        )
    }

    fn remove_member(&self, room: &Room, conn: &ConnectionId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }
}

fn unknown_connection(conn: &ConnectionId) -> RingcastError {
    RingcastError::transport(format!("unknown connection {conn}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringcast_core::event::{LikeUpdate, StoryView};
    use ringcast_core::{EntityKind, EventPayload, LikeAction, PostId, StoryId};

    fn like(actor: &str, post: &str) -> FanoutEvent {
        FanoutEvent::new(EventPayload::LikeUpdate(LikeUpdate {
            entity_kind: EntityKind::Post,
            entity_id: post.into(),
            actor_id: UserId::new(actor),
            action: LikeAction::Like,
            post_id: None,
            owner_id: None,
            committed_at: None,
        }))
    }

    fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn connect_joins_global() {
        let hub = RoomHub::new(8);
        let (id, _rx) = hub.connect();
        let session = hub.session(&id).unwrap();
        assert_eq!(session.rooms, vec![Room::Global]);
        assert!(session.user_id.is_none());
    }

    #[test]
    fn authenticate_joins_personal_room() {
        let hub = RoomHub::new(8);
        let (id, _rx) = hub.connect();
        let user = UserId::new("u1");
        hub.authenticate(&id, &user).unwrap();
        assert!(hub.members(&Room::User(user.clone())).contains(&id));
        hub.authenticate(&id, &user).unwrap();
        assert!(hub.authenticate(&id, &UserId::new("u2")).is_err());
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let hub = RoomHub::new(8);
        let (id, _rx) = hub.connect();
        let room = Room::Post(PostId::new("p"));
        assert!(hub.join(&id, &room).unwrap());
        assert!(!hub.join(&id, &room).unwrap());
        assert_eq!(hub.members(&room).len(), 1);
        assert!(hub.leave(&id, &room).unwrap());
        assert!(!hub.leave(&id, &room).unwrap());
        assert!(hub.members(&room).is_empty());
    }

    #[test]
    fn emit_reaches_exactly_current_members() {
        let hub = RoomHub::new(8);
        let room = Room::Post(PostId::new("p"));
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let (_c, mut rx_c) = hub.connect();
        hub.join(&a, &room).unwrap();
        hub.join(&b, &room).unwrap();
        hub.leave(&b, &room).unwrap();

        assert_eq!(hub.emit(&room, &like("x", "p")), 1);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn disconnect_revokes_memberships() {
        let hub = RoomHub::new(8);
        let room = Room::Post(PostId::new("p"));
        let (a, _rx) = hub.connect();
        hub.join(&a, &room).unwrap();
        let session = hub.disconnect(&a).unwrap();
        assert_eq!(session.rooms.len(), 2);
        assert!(hub.members(&room).is_empty());
        assert!(hub.members(&Room::Global).is_empty());
        assert_eq!(hub.stats(), HubStats { connections: 0, rooms: 0 });
        assert!(hub.join(&a, &room).is_err());
    }

    #[test]
    fn frames_stay_in_order_per_connection() {
        let hub = RoomHub::new(16);
        let room = Room::Post(PostId::new("p"));
        let (a, mut rx) = hub.connect();
        hub.join(&a, &room).unwrap();
        for actor in ["1", "2", "3"] {
            hub.emit(&room, &like(actor, "p"));
        }
        let actors: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|f| match f {
                ServerFrame::Event { event, .. } => event.actor().map(|u| u.0.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(actors, vec!["1", "2", "3"]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn full_queue_drops_instead_of_blocking() {
        let hub = RoomHub::new(1);
        let room = Room::Post(PostId::new("p"));
        let (a, mut rx) = hub.connect();
        hub.join(&a, &room).unwrap();
        assert_eq!(hub.emit(&room, &like("1", "p")), 1);
        assert_eq!(hub.emit(&room, &like("2", "p")), 0);
        assert_eq!(drain(&mut rx).len(), 1);
        assert!(logs_contain("outbound queue full"));
    }

    #[test]
    fn emit_from_stamps_origin_and_checks_actor() {
        let hub = RoomHub::new(8);
        let room = Room::Post(PostId::new("p"));
        let (a, mut rx) = hub.connect();
        hub.authenticate(&a, &UserId::new("alice")).unwrap();
        hub.join(&a, &room).unwrap();

        assert!(hub.emit_from(&a, &room, like("mallory", "p")).is_err());
        assert_eq!(hub.emit_from(&a, &room, like("alice", "p")).unwrap(), 1);

        match drain(&mut rx).pop().unwrap() {
            ServerFrame::Event { event, .. } => assert_eq!(event.origin, Some(a)),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn emit_from_keeps_like_commit_time() {
        let hub = RoomHub::new(8);
        let room = Room::Post(PostId::new("p"));
        let (a, mut rx) = hub.connect();
        hub.authenticate(&a, &UserId::new("alice")).unwrap();
        hub.join(&a, &room).unwrap();

        let committed = Utc::now() - chrono::Duration::seconds(5);
        let mut event = like("alice", "p");
        if let EventPayload::LikeUpdate(update) = &mut event.payload {
            update.committed_at = Some(committed);
        }
        hub.emit_from(&a, &room, event).unwrap();

        match drain(&mut rx).pop().unwrap() {
            ServerFrame::Event { event, .. } => {
                assert!(event.timestamp > committed);
                match event.payload {
                    EventPayload::LikeUpdate(update) => {
                        assert_eq!(update.committed_at, Some(committed))
                    }
                    other => panic!("unexpected payload {other:?}"),
                }
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn publish_delivers_once_per_connection() {
        let hub = RoomHub::new(8);
        let (a, mut rx) = hub.connect();
        hub.authenticate(&a, &UserId::new("owner")).unwrap();
        let view = FanoutEvent::new(EventPayload::StoryView(StoryView {
            owner_id: UserId::new("owner"),
            story_id: StoryId::new("s"),
            viewer_id: UserId::new("viewer"),
        }));
        let rooms = [Room::User(UserId::new("owner")), Room::Global];
        assert_eq!(hub.publish(&view, &rooms), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
