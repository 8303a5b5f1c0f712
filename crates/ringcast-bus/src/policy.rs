// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Who may join which room and emit which event.

use ringcast_core::{FanoutEvent, Room, RingcastError, UserId};

/// Check whether `user` may join `room`.
///
/// `user:` rooms are private to their user; everything else is open.
pub fn authorize_join(user: Option<&UserId>, room: &Room) -> Result<(), RingcastError> {
    match room {
        Room::User(owner) if Some(owner) != user => Err(RingcastError::Auth(format!(
            "cannot join private room {room}"
        ))),
        _ => Ok(()),
    }
}

/// Check whether `user` may emit `event` to `room` from a client connection.
///
/// The connection must be authenticated, the event must name the connection's
/// user as its actor, and `room` must be one of the event's routing rooms.
/// Events without an actor (feature toggles, verification changes) are
/// server-only.
pub fn authorize_emit(
    user: Option<&UserId>,
    room: &Room,
    event: &FanoutEvent,
) -> Result<(), RingcastError> {
    let user = user.ok_or_else(|| RingcastError::Auth("connection is not authenticated".into()))?;

    let actor = event.actor().ok_or_else(|| {
        RingcastError::Auth(format!(
            "{} events may only be published by the server",
            event.event_type()
        ))
    })?;
    if actor != user {
        return Err(RingcastError::Auth(format!(
            "{} names actor {actor} but connection belongs to {user}",
            event.event_type()
        )));
    }

    if !event.rooms().contains(room) {
        return Err(RingcastError::Protocol(format!(
            "{} events are not routed to {room}",
            event.event_type()
        )));
    }

    Ok(())
}
