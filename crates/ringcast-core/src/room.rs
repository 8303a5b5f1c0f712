// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named broadcast groups.
//!
//! Rooms are written on the wire as `user:{id}`, `post:{id}` or `global`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RingcastError;
use crate::types::{PostId, UserId};

/// A named broadcast group that connections join to receive fan-out events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// Personal notification and verification channel of one user.
    User(UserId),
    /// Comment and like updates scoped to one post.
    Post(PostId),
    /// Everyone (feature flags, story rings, profile images).
    Global,
}

impl Room {
    /// Whether only the named user may join this room.
    pub fn is_private(&self) -> bool {
        matches!(self, Room::User(_))
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Post(id) => write!(f, "post:{id}"),
            Room::Global => f.write_str("global"),
        }
    }
}

impl FromStr for Room {
    type Err = RingcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Room::Global);
        }
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| RingcastError::Protocol(format!("malformed room name `{s}`")))?;
        if id.is_empty() {
            return Err(RingcastError::Protocol(format!("room `{s}` has an empty id")));
        }
        match prefix {
            "user" => Ok(Room::User(UserId::new(id))),
            "post" => Ok(Room::Post(PostId::new(id))),
            other => Err(RingcastError::Protocol(format!(
                "unknown room kind `{other}`"
            ))),
        }
    }
}

impl Serialize for Room {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_names_round_trip() {
        for name in ["user:42", "post:p-9", "global"] {
            let room: Room = name.parse().unwrap();
            assert_eq!(room.to_string(), name);
        }
    }

    #[test]
    fn post_id_may_contain_colons() {
        let room: Room = "post:a:b".parse().unwrap();
        assert_eq!(room, Room::Post(PostId::new("a:b")));
    }

    #[test]
    fn unknown_or_malformed_rooms_are_protocol_errors() {
        for bad in ["lobby", "chat:1", "user:", ""] {
            let err = bad.parse::<Room>().unwrap_err();
            assert!(matches!(err, RingcastError::Protocol(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn only_user_rooms_are_private() {
        assert!(Room::User(UserId::new("u")).is_private());
        assert!(!Room::Post(PostId::new("p")).is_private());
        assert!(!Room::Global.is_private());
    }

    #[test]
    fn room_serializes_as_string() {
        let json = serde_json::to_string(&Room::Post(PostId::new("7"))).unwrap();
        assert_eq!(json, "\"post:7\"");
        let room: Room = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(room, Room::Global);
    }
}
