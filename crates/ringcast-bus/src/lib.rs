// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side event channel for Ringcast.
//!
//! [`RoomHub`] owns every live [`ConnectionSession`] and the room
//! memberships that route fan-out events to them. Each connection has one
//! bounded FIFO queue of outbound frames, so events are ordered per room per
//! connection. Delivery is at-most-once: a frame that does not fit into a full
//! queue is dropped and the client's correcting poll picks the change up.

pub mod hub;
pub mod policy;

pub use hub::{ConnectionSession, HubStats, RoomHub};
pub use policy::authorize_emit;
