// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged over the event channel.
//!
//! Client -> Server:
//! ```json
//! {"op": "join", "room": "post:42"}
//! {"op": "emit", "room": "post:42", "event": {"type": "likeUpdate", ...}}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"op": "welcome", "connection_id": "...", "user_id": "u1"}
//! {"op": "event", "room": "post:42", "event": {...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::event::FanoutEvent;
use crate::room::Room;
use crate::types::{ConnectionId, UserId};

/// A frame sent by a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { room: Room },
    Leave { room: Room },
    Emit { room: Room, event: FanoutEvent },
    Ping,
}

/// A frame sent by the server to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        connection_id: ConnectionId,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Joined { room: Room },
    Left { room: Room },
    Event { room: Room, event: FanoutEvent },
    Error { message: String },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostId;

    #[test]
    fn client_join_frame() {
        let frame: ClientFrame = serde_json::from_str(r#"{"op":"join","room":"post:42"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Join {
                room: Room::Post(PostId::new("42"))
            }
        );
    }

    #[test]
    fn ping_has_no_body() {
        let frame: ClientFrame = serde_json::from_str(r#"{"op":"ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);
        assert_eq!(serde_json::to_string(&ServerFrame::Pong).unwrap(), r#"{"op":"pong"}"#);
    }

    #[test]
    fn bad_room_in_frame_fails_to_decode() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"op":"join","room":"lobby"}"#).is_err());
    }

    #[test]
    fn welcome_frame_shape() {
        let frame = ServerFrame::Welcome {
            connection_id: ConnectionId::new("c1"),
            user_id: Some(UserId::new("u1")),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], "welcome");
        assert_eq!(json["connection_id"], "c1");
        assert_eq!(json["user_id"], "u1");
    }
}
