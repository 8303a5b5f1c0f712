// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Ringcast, the story/like/comment fan-out layer.
//!
//! This crate provides the vocabulary shared by the server-side event channel
//! and the client-side reconciliation core: identifiers, rooms, the closed
//! catalogue of fan-out events, the JSON wire frames, the error type, and the
//! traits for the external collaborators (the relational data store and the
//! durable local key/value storage).

pub mod error;
pub mod event;
pub mod protocol;
pub mod room;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RingcastError;
pub use event::{EventPayload, EventType, FanoutEvent, LikeAction};
pub use protocol::{ClientFrame, ServerFrame};
pub use room::Room;
pub use traits::{DataStore, DurableStorage};
pub use types::{
    Comment, CommentId, CommentPage, ConnectionId, EntityKind, EntityRef, FollowStatus,
    LikeStatus, PostId, Story, StoryId, UserId, ViewStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ringcast_error_has_all_variants() {
        let _config = RingcastError::Config("test".into());
        let _storage = RingcastError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _transport = RingcastError::Transport {
            message: "test".into(),
            source: None,
        };
        let _store = RingcastError::DataStore {
            message: "test".into(),
            source: None,
        };
        let _rejected = RingcastError::Rejected {
            message: "test".into(),
        };
        let _in_flight = RingcastError::MutationInFlight {
            entity: "post:1".into(),
            kind: "like".into(),
        };
        let _pre = RingcastError::Precondition("test".into());
        let _auth = RingcastError::Auth("test".into());
        let _proto = RingcastError::Protocol("test".into());
        let _timeout = RingcastError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = RingcastError::Internal("test".into());
    }

    #[test]
    fn all_collaborator_traits_are_exported() {
        fn _assert_data_store<T: DataStore>() {}
        fn _assert_durable_storage<T: DurableStorage>() {}
    }
}
