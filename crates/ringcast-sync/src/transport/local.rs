// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process transport talking to a [`RoomHub`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use ringcast_bus::RoomHub;
use ringcast_core::{ClientFrame, ConnectionId, RingcastError, ServerFrame, UserId};

use super::{ChannelConnection, EventTransport, not_connected};

/// Connects a client to a hub in the same process.
///
/// [`sever`](Self::sever) drops the connection and refuses new ones until
/// [`restore`](Self::restore), which stands in for a network outage.
pub struct LocalTransport {
    hub: Arc<RoomHub>,
    user: Option<UserId>,
    current: Mutex<Option<ConnectionId>>,
    severed: AtomicBool,
}

impl LocalTransport {
    pub fn new(hub: Arc<RoomHub>, user: Option<UserId>) -> Self {
        Self {
            hub,
            user,
            current: Mutex::new(None),
            severed: AtomicBool::new(false),
        }
    }

    /// Drop the live connection and refuse to reconnect.
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        if let Some(conn) = self.take_current() {
            self.hub.disconnect(&conn);
            debug!(conn = %conn, "local connection severed");
        }
    }

    /// Allow connections again.
    pub fn restore(&self) {
        self.severed.store(false, Ordering::SeqCst);
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_current(&self) -> Option<ConnectionId> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl EventTransport for LocalTransport {
    async fn connect(&self) -> Result<ChannelConnection, RingcastError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(RingcastError::transport("hub unreachable"));
        }
        if let Some(previous) = self.take_current() {
            self.hub.disconnect(&previous);
        }
        let (id, inbound) = self.hub.connect();
        if let Some(user) = &self.user
            && let Err(e) = self.hub.authenticate(&id, user)
        {
            self.hub.disconnect(&id);
            return Err(e);
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
        Ok(ChannelConnection {
            id,
            user: self.user.clone(),
            inbound,
        })
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), RingcastError> {
        let conn = self.connection_id().ok_or_else(not_connected)?;
        match frame {
            ClientFrame::Join { room } => {
                self.hub.join(&conn, &room)?;
                self.hub.send(&conn, ServerFrame::Joined { room });
            }
            ClientFrame::Leave { room } => {
                self.hub.leave(&conn, &room)?;
                self.hub.send(&conn, ServerFrame::Left { room });
            }
            ClientFrame::Emit { room, event } => {
                self.hub.emit_from(&conn, &room, event)?;
            }
            ClientFrame::Ping => {
                self.hub.send(&conn, ServerFrame::Pong);
            }
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(conn) = self.take_current() {
            self.hub.disconnect(&conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringcast_core::{PostId, Room};

    #[tokio::test]
    async fn connect_authenticates_and_joins() {
        let hub = Arc::new(RoomHub::new(8));
        let transport = LocalTransport::new(hub.clone(), Some(UserId::new("u1")));
        let conn = transport.connect().await.unwrap();
        let session = hub.session(&conn.id).unwrap();
        assert_eq!(session.user_id, Some(UserId::new("u1")));
        assert!(session.rooms.contains(&Room::User(UserId::new("u1"))));

        let room = Room::Post(PostId::new("P"));
        transport
            .send(ClientFrame::Join { room: room.clone() })
            .await
            .unwrap();
        assert_eq!(hub.members(&room), vec![conn.id]);
    }

    #[tokio::test]
    async fn sever_closes_inbound_and_blocks_reconnect() {
        let hub = Arc::new(RoomHub::new(8));
        let transport = LocalTransport::new(hub.clone(), None);
        let mut conn = transport.connect().await.unwrap();
        transport.sever();
        assert!(conn.inbound.recv().await.is_none());
        assert!(transport.connect().await.is_err());
        assert!(transport.send(ClientFrame::Ping).await.is_err());

        transport.restore();
        let again = transport.connect().await.unwrap();
        assert_ne!(again.id, conn.id);
        assert_eq!(hub.stats().connections, 1);
    }

    #[tokio::test]
    async fn refused_join_is_an_error() {
        let hub = Arc::new(RoomHub::new(8));
        let transport = LocalTransport::new(hub, Some(UserId::new("u1")));
        transport.connect().await.unwrap();
        let err = transport
            .send(ClientFrame::Join {
                room: Room::User(UserId::new("someone-else")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RingcastError::Auth(_)));
    }
}
