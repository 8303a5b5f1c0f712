// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket handler for the event channel.
//!
//! A client connects to `/ws?token=<connection token>`; the token is optional
//! but an anonymous connection can only listen to open rooms. Frames are the
//! JSON [`ClientFrame`] / [`ServerFrame`] types from `ringcast-core`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use ringcast_bus::RoomHub;
use ringcast_core::{ClientFrame, ConnectionId, RingcastError, ServerFrame, UserId};

use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler. A bad token fails the handshake with 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<GatewayState>,
) -> Response {
    let user = match params.token.as_deref().map(|t| state.tokens.verify(t)) {
        None => None,
        Some(Ok(user)) => Some(user),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "rejecting WebSocket handshake");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Drive one connection until the client goes away.
///
/// Outbound frames flow from the hub's per-connection queue through a
/// forwarding task; inbound frames are handled inline so that one client's
/// frames are processed in order.
async fn handle_socket(socket: WebSocket, state: GatewayState, user: Option<UserId>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (conn, mut rx) = state.hub.connect();

    if let Some(user) = &user
        && let Err(e) = state.hub.authenticate(&conn, user)
    {
        tracing::error!(conn = %conn, error = %e, "failed to authenticate connection");
        state.hub.disconnect(&conn);
        return;
    }
    state.hub.send(
        &conn,
        ServerFrame::Welcome {
            connection_id: conn.clone(),
            user_id: user,
        },
    );

    let forward_conn = conn.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(conn = %forward_conn, error = %e, "failed to encode frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                if let Some(reply) = handle_frame(&state.hub, &conn, text.as_str()) {
                    state.hub.send(&conn, reply);
                }
            }
            Message::Close(_) => break,
            _ => {} // binary frames are not part of the protocol; pings are handled below us
        }
    }

    state.hub.disconnect(&conn);
    sender_task.abort();
}

/// Apply one client frame and produce the direct reply, if any.
pub(crate) fn handle_frame(hub: &RoomHub, conn: &ConnectionId, text: &str) -> Option<ServerFrame> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(conn = %conn, "invalid client frame: {e}");
            return Some(error_frame(format!("invalid frame: {e}")));
        }
    };

    let result: Result<Option<ServerFrame>, RingcastError> = match frame {
        ClientFrame::Join { room } => hub
            .join(conn, &room)
            .map(|_| Some(ServerFrame::Joined { room })),
        ClientFrame::Leave { room } => hub
            .leave(conn, &room)
            .map(|_| Some(ServerFrame::Left { room })),
        ClientFrame::Emit { room, event } => {
            hub.emit_from(conn, &room, event).map(|delivered| {
                tracing::debug!(conn = %conn, room = %room, delivered, "client event fanned out");
                None
            })
        }
        ClientFrame::Ping => Ok(Some(ServerFrame::Pong)),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(conn = %conn, error = %e, "client frame refused");
        Some(error_frame(e.to_string()))
    })
}

fn error_frame(message: String) -> ServerFrame {
    ServerFrame::Error { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringcast_core::{PostId, Room};

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn ws_params_token_is_optional() {
        let params: WsParams = serde_json::from_str("{}").unwrap();
        assert!(params.token.is_none());
    }

    #[test]
    fn join_then_leave_replies() {
        let hub = RoomHub::new(8);
        let (conn, _rx) = hub.connect();
        let reply = handle_frame(&hub, &conn, r#"{"op":"join","room":"post:9"}"#);
        assert_eq!(
            reply,
            Some(ServerFrame::Joined {
                room: Room::Post(PostId::new("9"))
            })
        );
        let reply = handle_frame(&hub, &conn, r#"{"op":"leave","room":"post:9"}"#);
        assert!(matches!(reply, Some(ServerFrame::Left { .. })));
    }

    #[test]
    fn garbage_gets_an_error_frame() {
        let hub = RoomHub::new(8);
        let (conn, _rx) = hub.connect();
        let reply = handle_frame(&hub, &conn, "not json");
        assert!(matches!(reply, Some(ServerFrame::Error { .. })));
    }

    #[test]
    fn anonymous_emit_is_refused() {
        let hub = RoomHub::new(8);
        let (conn, _rx) = hub.connect();
        let frame = r#"{"op":"emit","room":"post:P","event":{"type":"likeUpdate",
            "payload":{"entityKind":"post","entityId":"P","actorId":"a","action":"like"},
            "timestamp":"2026-01-01T00:00:00Z"}}"#;
        let reply = handle_frame(&hub, &conn, frame);
        match reply {
            Some(ServerFrame::Error { message }) => assert!(message.contains("auth")),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn authenticated_emit_fans_out_without_reply() {
        let hub = RoomHub::new(8);
        let (alice, _rx_a) = hub.connect();
        hub.authenticate(&alice, &UserId::new("a")).unwrap();
        let (bob, mut rx_b) = hub.connect();
        hub.join(&bob, &Room::Post(PostId::new("P"))).unwrap();

        let frame = r#"{"op":"emit","room":"post:P","event":{"type":"likeUpdate",
            "payload":{"entityKind":"post","entityId":"P","actorId":"a","action":"like"},
            "timestamp":"2000-01-01T00:00:00Z"}}"#;
        assert!(handle_frame(&hub, &alice, frame).is_none());

        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            ServerFrame::Event { event, .. } => {
                assert_eq!(event.origin.as_ref(), Some(&alice));
                assert!(event.timestamp.timestamp() > 946_684_800);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn ping_pongs() {
        let hub = RoomHub::new(8);
        let (conn, _rx) = hub.connect();
        assert_eq!(
            handle_frame(&hub, &conn, r#"{"op":"ping"}"#),
            Some(ServerFrame::Pong)
        );
    }
}
