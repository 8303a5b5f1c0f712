// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side reconciliation core for Ringcast.
//!
//! Each session keeps derived state (like counters, comment threads, story
//! rings) that converges from three inputs: fan-out events on the channel,
//! authoritative fetches from the data store, and the user's own optimistic
//! mutations. [`SyncClient`] ties them together; the pieces are usable on
//! their own for tests and alternative front ends.

pub mod client;
pub mod freshness;
pub mod optimistic;
pub mod reconcile;
pub mod state;
pub mod topics;
pub mod transport;
pub mod view_state;

pub use client::{
    Action, ActionOutcome, DerivedViewState, EntityHandlers, EntitySubscription, SyncClient,
    SyncOptions, ViewScope,
};
pub use optimistic::{MutationCoordinator, MutationKind, MutationTarget, OptimisticMutation};
pub use reconcile::{Merge, ReconciliationEngine, RingView};
pub use topics::{LocalBus, Notice, Notification, Subscription, Topic};
pub use transport::{ChannelConnection, EventTransport, LocalTransport, WsTransport};
pub use view_state::{ViewStateEntry, ViewStateStore};
