// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic mutations and the in-flight registry.
//!
//! A mutation is applied locally first, then sent to the data store. The
//! [`OptimisticMutation`] carries the pre-action snapshot so a failed request
//! can be undone exactly, without help from whoever started it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use strum::Display;
use uuid::Uuid;

use ringcast_core::{Comment, CommentId, EntityRef, PostId, RingcastError, Story, StoryId, UserId};

use crate::state::{LikeState, LocalState};
use crate::view_state::{ViewStateEntry, ViewStateStore};

/// The user action being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Like,
    Unlike,
    Comment,
    DeleteComment,
    View,
    Upload,
    DeleteStory,
}

impl MutationKind {
    /// Kinds sharing a lane exclude each other while in flight.
    pub fn lane(self) -> MutationKind {
        match self {
            MutationKind::Like | MutationKind::Unlike => MutationKind::Like,
            other => other,
        }
    }
}

/// What a mutation acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Entity(EntityRef),
    /// An owner's set of stories (views, uploads).
    StoryRing(UserId),
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::Entity(e) => fmt::Display::fmt(e, f),
            MutationTarget::StoryRing(owner) => write!(f, "stories:{owner}"),
        }
    }
}

/// Local state as it was before a mutation was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// `None` when the entity had no like state before.
    Like { prior: Option<LikeState> },
    CommentAdd { post_id: PostId, temp_id: CommentId },
    CommentDelete {
        post_id: PostId,
        removed: Vec<Comment>,
        prior_total: i64,
    },
    View {
        owner: UserId,
        viewer: UserId,
        prior: ViewStateEntry,
    },
    Upload { owner: UserId, temp_id: StoryId },
    StoryDelete { owner: UserId, removed: Story },
}

/// An in-flight user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticMutation {
    pub id: Uuid,
    pub kind: MutationKind,
    pub target: MutationTarget,
    pub submitted_at: DateTime<Utc>,
    /// Placeholder id of an entity the server has not stored yet.
    pub temp_id: Option<String>,
    snapshot: Snapshot,
}

impl OptimisticMutation {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Put local state back to the snapshot.
    pub fn rollback(&self, state: &mut LocalState, views: &ViewStateStore) -> Result<(), RingcastError> {
        match &self.snapshot {
            Snapshot::Like { prior } => {
                if let MutationTarget::Entity(entity) = &self.target {
                    match prior {
                        Some(prior) => {
                            state.likes.insert(entity.clone(), prior.clone());
                        }
                        None => {
                            state.likes.remove(entity);
                        }
                    }
                }
            }
            Snapshot::CommentAdd { post_id, temp_id } => {
                if let Some(thread) = state.threads.get_mut(post_id)
                    && !thread.remove(temp_id).is_empty()
                {
                    thread.total_count = (thread.total_count - 1).max(0);
                }
            }
            Snapshot::CommentDelete {
                post_id,
                removed,
                prior_total,
            } => {
                if let Some(thread) = state.threads.get_mut(post_id) {
                    for comment in removed {
                        thread.insert(comment.clone());
                    }
                    thread.total_count = *prior_total;
                }
            }
            Snapshot::View {
                owner,
                viewer,
                prior,
            } => views.put(owner, viewer, prior)?,
            Snapshot::Upload { owner, temp_id } => {
                if let Some(ring) = state.rings.get_mut(owner) {
                    ring.remove(temp_id);
                }
            }
            Snapshot::StoryDelete { owner, removed } => {
                if let Some(ring) = state.rings.get_mut(owner) {
                    ring.insert(removed.clone());
                }
            }
        }
        Ok(())
    }
}

/// Tracks which (target, lane) pairs have a mutation in flight.
#[derive(Debug, Default)]
pub struct MutationCoordinator {
    in_flight: HashMap<(MutationTarget, MutationKind), Uuid>,
}

impl MutationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `kind` is already in flight for `target`.
    pub fn check(&self, target: &MutationTarget, kind: MutationKind) -> Result<(), RingcastError> {
        if self.in_flight.contains_key(&(target.clone(), kind.lane())) {
            return Err(RingcastError::MutationInFlight {
                entity: target.to_string(),
                kind: kind.lane().to_string(),
            });
        }
        Ok(())
    }

    /// Register a new mutation.
    pub fn begin(
        &mut self,
        kind: MutationKind,
        target: MutationTarget,
        temp_id: Option<String>,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> Result<OptimisticMutation, RingcastError> {
        self.check(&target, kind)?;
        let mutation = OptimisticMutation {
            id: Uuid::new_v4(),
            kind,
            target,
            submitted_at: now,
            temp_id,
            snapshot,
        };
        self.in_flight
            .insert((mutation.target.clone(), kind.lane()), mutation.id);
        tracing::debug!(mutation = %mutation.target, kind = %kind, id = %mutation.id, "mutation started");
        Ok(mutation)
    }

    /// Clear the in-flight marker of `mutation`, whatever its outcome.
    pub fn settle(&mut self, mutation: &OptimisticMutation) -> bool {
        let key = (mutation.target.clone(), mutation.kind.lane());
        if self.in_flight.get(&key) == Some(&mutation.id) {
            self.in_flight.remove(&key);
            return true;
        }
        false
    }

    /// Whether any mutation is in flight for `target`.
    pub fn is_pending(&self, target: &MutationTarget) -> bool {
        self.in_flight.keys().any(|(t, _)| t == target)
    }

    pub fn is_pending_kind(&self, target: &MutationTarget, kind: MutationKind) -> bool {
        self.in_flight.contains_key(&(target.clone(), kind.lane()))
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
