// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client ends of the event channel.
//!
//! A transport opens one connection at a time. Inbound frames arrive on the
//! receiver handed out by [`EventTransport::connect`]; the receiver yields
//! `None` once the connection is gone, which is how the client notices a drop.

pub mod local;
pub mod ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ringcast_core::{ClientFrame, ConnectionId, RingcastError, ServerFrame, UserId};

pub use local::LocalTransport;
pub use ws::WsTransport;

/// A live connection to the event channel.
#[derive(Debug)]
pub struct ChannelConnection {
    pub id: ConnectionId,
    /// The user the server bound this connection to, if authenticated.
    pub user: Option<UserId>,
    pub inbound: mpsc::Receiver<ServerFrame>,
}

/// Opens connections and sends frames over the current one.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Open a new connection, replacing any previous one.
    async fn connect(&self) -> Result<ChannelConnection, RingcastError>;

    /// Send a frame over the current connection.
    async fn send(&self, frame: ClientFrame) -> Result<(), RingcastError>;

    /// Close the current connection, if any.
    async fn disconnect(&self);

    /// Drop the current connection and open a fresh one.
    async fn reconnect(&self) -> Result<ChannelConnection, RingcastError> {
        self.disconnect().await;
        self.connect().await
    }
}

fn not_connected() -> RingcastError {
    RingcastError::transport("not connected")
}
