// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging of fan-out events, fetch results and own mutations into local state.
//!
//! Precedence, highest first: an own mutation still in flight, an own
//! confirmed mutation, an event from another actor, a poll. In practice:
//!
//! * events this session emitted itself are dropped (already applied);
//! * anything touching an entity with an own mutation in flight waits;
//! * deltas stamped at or before the last authoritative value are skipped;
//! * a fetch that started before the last authoritative value is discarded;
//! * collections merge by id, so nothing appears twice.
//!
//! The engine never publishes directly. Changes queue up as notifications and
//! the owner drains them with [`ReconciliationEngine::take_notifications`]
//! after releasing its lock, so handlers may call back in.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use ringcast_core::event::{
    CommentCreate, CommentDelete, LikeUpdate, StoryDeleted, StoryUploaded, StoryView,
};
use ringcast_core::{
    Comment, CommentId, CommentPage, ConnectionId, EntityRef, EventPayload, FanoutEvent,
    LikeAction, LikeStatus, PostId, RingcastError, Story, StoryId, UserId, ViewStatus,
};

use crate::freshness;
use crate::optimistic::{
    MutationCoordinator, MutationKind, MutationTarget, OptimisticMutation, Snapshot,
};
use crate::state::{CommentThread, LikeState, LocalState, StoryRing};
use crate::topics::{Notification, Topic};
use crate::view_state::ViewStateStore;

/// How an event or fetch result was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Applied,
    /// Emitted by this session; its effect is already local.
    OwnSession,
    /// Older than the current authoritative value.
    Stale,
    /// Already reflected (same id, or same actor action).
    Duplicate,
    /// An own mutation on the same target is in flight and wins.
    Pending,
    /// Refers to nothing loaded in this session.
    Unknown,
}

/// Derived story ring state for one owner, as the viewer sees it now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingView {
    pub active: Vec<Story>,
    pub has_unviewed: bool,
}

/// Reconciliation core of one client session.
pub struct ReconciliationEngine {
    viewer: UserId,
    connections: HashSet<ConnectionId>,
    state: LocalState,
    mutations: MutationCoordinator,
    views: ViewStateStore,
    story_ttl_hours: u32,
    outbox: Vec<(Topic, Notification)>,
}

impl ReconciliationEngine {
    pub fn new(viewer: UserId, views: ViewStateStore, story_ttl_hours: u32) -> Self {
        Self {
            viewer,
            connections: HashSet::new(),
            state: LocalState::default(),
            mutations: MutationCoordinator::new(),
            views,
            story_ttl_hours,
            outbox: Vec::new(),
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn state(&self) -> &LocalState {
        &self.state
    }

    pub fn views(&self) -> &ViewStateStore {
        &self.views
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub fn story_ttl_hours(&self) -> u32 {
        self.story_ttl_hours
    }

    /// Record a connection id as belonging to this session.
    ///
    /// Earlier ids are kept: a late frame from a previous connection is still ours.
    pub fn attach_connection(&mut self, id: ConnectionId) {
        self.connections.insert(id);
    }

    pub fn take_notifications(&mut self) -> Vec<(Topic, Notification)> {
        std::mem::take(&mut self.outbox)
    }

    fn notify(&mut self, topic: Topic, notification: Notification) {
        self.outbox.push((topic, notification));
    }

    /// Whether `event` describes something this session did itself.
    pub fn is_own(&self, event: &FanoutEvent) -> bool {
        match &event.origin {
            Some(origin) => self.connections.contains(origin),
            None => event.actor() == Some(&self.viewer),
        }
    }

    /// Start tracking a post's comment thread so its events apply.
    pub fn track_post(&mut self, post: &PostId) {
        self.state
            .threads
            .entry(post.clone())
            .or_insert_with(|| CommentThread::new(post.clone()));
    }

    /// Stop tracking a post; later events for it are no-ops.
    pub fn forget_post(&mut self, post: &PostId) {
        if let Some(thread) = self.state.threads.remove(post) {
            for comment in &thread.items {
                self.state.likes.remove(&EntityRef::comment(&comment.id));
            }
        }
        self.state.likes.remove(&EntityRef::post(post));
    }

    pub fn track_ring(&mut self, owner: &UserId) {
        self.state
            .rings
            .entry(owner.clone())
            .or_insert_with(|| StoryRing::new(owner.clone()));
    }

    pub fn forget_ring(&mut self, owner: &UserId) {
        if let Some(ring) = self.state.rings.remove(owner) {
            for story in &ring.stories {
                self.state.likes.remove(&EntityRef::story(&story.id));
            }
        }
    }

    /// Active stories and unviewed flag for `owner`, if its ring is loaded.
    pub fn ring_view(&self, owner: &UserId, now: DateTime<Utc>) -> Option<RingView> {
        let ring = self.state.rings.get(owner)?;
        let active = freshness::active_stories(&ring.stories, now, self.story_ttl_hours);
        let entry = self.views.get(owner, &self.viewer);
        let has_unviewed = freshness::has_unviewed(owner, &self.viewer, &active, &entry);
        Some(RingView {
            active,
            has_unviewed,
        })
    }

    fn notify_ring(&mut self, owner: &UserId, now: DateTime<Utc>) {
        if let Some(view) = self.ring_view(owner, now) {
            self.notify(
                Topic::StoryRing(owner.clone()),
                Notification::StoryRing {
                    owner: owner.clone(),
                    active_count: view.active.len(),
                    has_unviewed: view.has_unviewed,
                },
            );
        }
    }

    fn notify_like(&mut self, entity: &EntityRef) {
        let status = self
            .state
            .likes
            .get(entity)
            .map(LikeState::status)
            .unwrap_or(LikeStatus {
                liked: false,
                count: 0,
            });
        self.notify(
            Topic::Entity(entity.clone()),
            Notification::Like {
                entity: entity.clone(),
                liked: status.liked,
                count: status.count,
            },
        );
    }

    fn notify_comment_removed(&mut self, post: &PostId, comment: &CommentId) {
        self.notify(
            Topic::Comments(post.clone()),
            Notification::CommentRemoved {
                post_id: post.clone(),
                comment_id: comment.clone(),
            },
        );
        self.notify(
            Topic::Entity(EntityRef::comment(comment)),
            Notification::CommentRemoved {
                post_id: post.clone(),
                comment_id: comment.clone(),
            },
        );
    }

    // ----- fan-out events -------------------------------------------------

    /// Merge one fan-out event.
    pub fn apply_event(&mut self, event: &FanoutEvent, now: DateTime<Utc>) -> Merge {
        if self.is_own(event) {
            debug!(kind = %event.event_type(), "own event ignored");
            return Merge::OwnSession;
        }
        let at = event.timestamp;
        let merge = match &event.payload {
            EventPayload::LikeUpdate(e) => self.apply_like(e, at),
            EventPayload::CommentCreate(e) => self.apply_comment_create(e, at),
            EventPayload::CommentDelete(e) => self.apply_comment_delete(e, at),
            EventPayload::StoryView(e) => self.apply_story_view(e, at, now),
            EventPayload::StoryUploaded(e) => self.apply_story_uploaded(e, now),
            EventPayload::StoryDeleted(e) => self.apply_story_deleted(e, now),
            EventPayload::ProfileUpdate(e) => {
                let profile = self.state.profiles.entry(e.user_id.clone()).or_default();
                if profile.image == e.image {
                    Merge::Duplicate
                } else {
                    profile.image = e.image.clone();
                    self.notify(
                        Topic::Profile(e.user_id.clone()),
                        Notification::Profile {
                            user_id: e.user_id.clone(),
                            image: e.image.clone(),
                        },
                    );
                    Merge::Applied
                }
            }
            EventPayload::VerificationUpdate(e) => {
                let profile = self.state.profiles.entry(e.user_id.clone()).or_default();
                if profile.verified == Some(e.verified) {
                    Merge::Duplicate
                } else {
                    profile.verified = Some(e.verified);
                    self.notify(
                        Topic::Profile(e.user_id.clone()),
                        Notification::Verification {
                            user_id: e.user_id.clone(),
                            verified: e.verified,
                        },
                    );
                    Merge::Applied
                }
            }
            EventPayload::FeatureToggle(e) => {
                if self.state.flags.insert(e.flag_name.clone(), e.enabled) == Some(e.enabled) {
                    Merge::Duplicate
                } else {
                    self.notify(
                        Topic::FeatureFlags,
                        Notification::FeatureFlag {
                            name: e.flag_name.clone(),
                            enabled: e.enabled,
                        },
                    );
                    Merge::Applied
                }
            }
        };
        debug!(kind = %event.event_type(), ?merge, "event merged");
        merge
    }

    fn apply_like(&mut self, e: &LikeUpdate, at: DateTime<Utc>) -> Merge {
        let at = e.committed_at.unwrap_or(at);
        let entity = e.entity();
        let is_viewer = e.actor_id == self.viewer;
        if is_viewer
            && self
                .mutations
                .is_pending(&MutationTarget::Entity(entity.clone()))
        {
            return Merge::Pending;
        }
        let Some(like) = self.state.likes.get_mut(&entity) else {
            return Merge::Unknown;
        };
        if like.baseline_at.is_some_and(|baseline| at <= baseline) {
            return Merge::Stale;
        }
        if !like.apply_delta(&e.actor_id, e.action, at, is_viewer) {
            return Merge::Duplicate;
        }
        self.notify_like(&entity);
        Merge::Applied
    }

    fn apply_comment_create(&mut self, e: &CommentCreate, at: DateTime<Utc>) -> Merge {
        let Some(thread) = self.state.threads.get_mut(&e.post_id) else {
            return Merge::Unknown;
        };
        if !thread.insert(e.comment.clone()) {
            return Merge::Duplicate;
        }
        if thread.baseline_at.is_none_or(|baseline| at > baseline) {
            thread.total_count += 1;
        }
        self.notify(
            Topic::Comments(e.post_id.clone()),
            Notification::CommentAdded {
                post_id: e.post_id.clone(),
                comment: e.comment.clone(),
            },
        );
        Merge::Applied
    }

    fn apply_comment_delete(&mut self, e: &CommentDelete, at: DateTime<Utc>) -> Merge {
        let removed = {
            let Some(thread) = self.state.threads.get_mut(&e.post_id) else {
                return Merge::Unknown;
            };
            let removed = thread.remove(&e.comment_id);
            if !removed.is_empty() && thread.baseline_at.is_none_or(|baseline| at > baseline) {
                thread.total_count = (thread.total_count - removed.len() as i64).max(0);
            }
            removed
        };
        if removed.is_empty() {
            debug!(post = %e.post_id, comment = %e.comment_id, "delete of unknown comment ignored");
            return Merge::Unknown;
        }
        for comment in &removed {
            self.state.likes.remove(&EntityRef::comment(&comment.id));
            self.notify_comment_removed(&e.post_id, &comment.id);
        }
        Merge::Applied
    }

    fn apply_story_view(&mut self, e: &StoryView, at: DateTime<Utc>, now: DateTime<Utc>) -> Merge {
        if e.viewer_id == self.viewer {
            let before = self.views.get(&e.owner_id, &self.viewer);
            if before.viewed_item_ids.contains(&e.story_id) && before.last_viewed_at >= Some(at) {
                return Merge::Duplicate;
            }
            if let Err(err) = self.views.mark_viewed(
                &e.owner_id,
                &self.viewer,
                std::slice::from_ref(&e.story_id),
                at,
            ) {
                warn!(owner = %e.owner_id, error = %err, "failed to persist view from another session");
            }
            self.notify_ring(&e.owner_id, now);
            Merge::Applied
        } else if e.owner_id == self.viewer {
            self.notify(
                Topic::StoryRing(e.owner_id.clone()),
                Notification::StoryViewed {
                    owner: e.owner_id.clone(),
                    story_id: e.story_id.clone(),
                    viewer: e.viewer_id.clone(),
                },
            );
            Merge::Applied
        } else {
            Merge::Unknown
        }
    }

    fn apply_story_uploaded(&mut self, e: &StoryUploaded, now: DateTime<Utc>) -> Merge {
        if e.owner_id == self.viewer
            && self.mutations.is_pending_kind(
                &MutationTarget::StoryRing(e.owner_id.clone()),
                MutationKind::Upload,
            )
        {
            return Merge::Pending;
        }
        let Some(ring) = self.state.rings.get_mut(&e.owner_id) else {
            return Merge::Unknown;
        };
        if !ring.insert(e.story.clone()) {
            return Merge::Duplicate;
        }
        self.notify_ring(&e.owner_id, now);
        Merge::Applied
    }

    fn apply_story_deleted(&mut self, e: &StoryDeleted, now: DateTime<Utc>) -> Merge {
        let Some(ring) = self.state.rings.get_mut(&e.owner_id) else {
            return Merge::Unknown;
        };
        let removed = ring.remove(&e.story_id).is_some();
        let cleared = e.remaining_count <= 0 && !ring.stories.is_empty();
        if cleared {
            ring.stories.retain(|s| s.id.is_temporary());
        }
        if !removed && !cleared {
            return Merge::Unknown;
        }
        self.state.likes.remove(&EntityRef::story(&e.story_id));
        self.notify(
            Topic::Entity(EntityRef::story(&e.story_id)),
            Notification::StoryRemoved {
                owner: e.owner_id.clone(),
                story_id: e.story_id.clone(),
            },
        );
        self.notify_ring(&e.owner_id, now);
        Merge::Applied
    }

    // ----- authoritative fetches ------------------------------------------

    /// Merge a fetched like status taken at `fetched_at`.
    pub fn merge_like_status(
        &mut self,
        entity: &EntityRef,
        status: LikeStatus,
        fetched_at: DateTime<Utc>,
    ) -> Merge {
        if self
            .mutations
            .is_pending(&MutationTarget::Entity(entity.clone()))
        {
            return Merge::Pending;
        }
        let like = self
            .state
            .likes
            .entry(entity.clone())
            .or_insert_with(LikeState::empty);
        if like.baseline_at.is_some_and(|baseline| fetched_at < baseline) {
            return Merge::Stale;
        }
        let changed = like.status() != status;
        like.replace(status, fetched_at);
        if changed {
            self.notify_like(entity);
        }
        Merge::Applied
    }

    /// Comments referenced by `items` (as themselves or as a reply's parent)
    /// that this session is currently deleting.
    fn deleting_comments(&self, items: &[Comment]) -> HashSet<CommentId> {
        items
            .iter()
            .flat_map(|c| std::iter::once(&c.id).chain(c.parent_id.as_ref()))
            .filter(|id| {
                self.mutations.is_pending_kind(
                    &MutationTarget::Entity(EntityRef::comment(id)),
                    MutationKind::DeleteComment,
                )
            })
            .cloned()
            .collect()
    }

    /// Replace a post's loaded comments with `page`, the concatenation of
    /// the first `pages_loaded` pages. Placeholders of own comments still in
    /// flight are kept; comments with an own delete in flight stay gone,
    /// replies included.
    pub fn merge_comment_pages(
        &mut self,
        post: &PostId,
        page: CommentPage,
        pages_loaded: u32,
        fetched_at: DateTime<Utc>,
    ) -> Merge {
        let deleting = self.deleting_comments(&page.items);
        let thread = self
            .state
            .threads
            .entry(post.clone())
            .or_insert_with(|| CommentThread::new(post.clone()));
        if thread.baseline_at.is_some_and(|baseline| fetched_at < baseline) {
            return Merge::Stale;
        }
        let pending = thread.pending();
        thread.items.clear();
        for comment in page.items {
            thread.insert(comment);
        }
        let before = thread.items.len();
        for id in &deleting {
            thread.remove(id);
        }
        thread
            .items
            .retain(|c| !c.parent_id.as_ref().is_some_and(|p| deleting.contains(p)));
        let hidden = (before - thread.items.len()) as i64;
        let mut extra = 0;
        for comment in pending {
            if thread.insert(comment) {
                extra += 1;
            }
        }
        thread.total_count = (page.total_count - hidden).max(0) + extra;
        thread.has_more = page.has_more;
        thread.pages_loaded = pages_loaded.max(1);
        thread.baseline_at = Some(fetched_at);
        let total_count = thread.total_count;
        self.notify(
            Topic::Comments(post.clone()),
            Notification::CommentsRefreshed {
                post_id: post.clone(),
                total_count,
            },
        );
        Merge::Applied
    }

    /// Append the next page of a thread ("load more").
    pub fn append_comment_page(&mut self, post: &PostId, page: CommentPage) -> Merge {
        let deleting = self.deleting_comments(&page.items);
        let Some(thread) = self.state.threads.get_mut(post) else {
            return Merge::Unknown;
        };
        let mut added = Vec::new();
        for comment in page.items {
            let gone = deleting.contains(&comment.id)
                || comment.parent_id.as_ref().is_some_and(|p| deleting.contains(p));
            if !gone && thread.insert(comment.clone()) {
                added.push(comment);
            }
        }
        thread.has_more = page.has_more;
        thread.pages_loaded += 1;
        for comment in added {
            self.notify(
                Topic::Comments(post.clone()),
                Notification::CommentAdded {
                    post_id: post.clone(),
                    comment,
                },
            );
        }
        Merge::Applied
    }

    /// Replace an owner's stories with a fetched list of active stories.
    pub fn merge_stories(
        &mut self,
        owner: &UserId,
        stories: Vec<Story>,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Merge {
        let ring_target = MutationTarget::StoryRing(owner.clone());
        let upload_pending = self
            .mutations
            .is_pending_kind(&ring_target, MutationKind::Upload);
        let view_pending = self.mutations.is_pending_kind(&ring_target, MutationKind::View);
        let deleting: HashSet<StoryId> = stories
            .iter()
            .filter(|s| {
                self.mutations.is_pending_kind(
                    &MutationTarget::Entity(EntityRef::story(&s.id)),
                    MutationKind::DeleteStory,
                )
            })
            .map(|s| s.id.clone())
            .collect();

        let ring = self
            .state
            .rings
            .entry(owner.clone())
            .or_insert_with(|| StoryRing::new(owner.clone()));
        if ring.baseline_at.is_some_and(|baseline| fetched_at < baseline) {
            return Merge::Stale;
        }
        let placeholders: Vec<Story> = ring
            .stories
            .iter()
            .filter(|s| s.id.is_temporary())
            .cloned()
            .collect();
        ring.stories.clear();
        for story in stories {
            if !deleting.contains(&story.id) {
                ring.insert(story);
            }
        }
        if upload_pending {
            for story in placeholders {
                ring.insert(story);
            }
        }
        ring.baseline_at = Some(fetched_at);
        let active_ids = ring.ids();

        if !view_pending
            && let Err(e) = self.views.retain_active(owner, &self.viewer, &active_ids)
        {
            warn!(owner = %owner, error = %e, "failed to prune view-state");
        }
        self.notify_ring(owner, now);
        Merge::Applied
    }

    /// Merge server truth about what the viewer has seen of `owner`.
    pub fn merge_view_status(
        &mut self,
        owner: &UserId,
        status: &ViewStatus,
        now: DateTime<Utc>,
    ) -> Merge {
        if let Err(e) = self.views.reconcile(owner, &self.viewer, status) {
            warn!(owner = %owner, error = %e, "failed to persist view status");
        }
        self.notify_ring(owner, now);
        Merge::Applied
    }

    // ----- own mutations --------------------------------------------------

    /// Apply a like or unlike optimistically.
    ///
    /// `Ok(None)` when the entity is already in the requested state.
    pub fn begin_like(
        &mut self,
        entity: &EntityRef,
        action: LikeAction,
        now: DateTime<Utc>,
    ) -> Result<Option<OptimisticMutation>, RingcastError> {
        let target = MutationTarget::Entity(entity.clone());
        self.mutations.check(&target, MutationKind::Like)?;
        let prior = self.state.likes.get(entity).cloned();
        if prior.as_ref().is_some_and(|l| l.liked) == action.liked() {
            return Ok(None);
        }
        let kind = match action {
            LikeAction::Like => MutationKind::Like,
            LikeAction::Unlike => MutationKind::Unlike,
        };
        let mutation = self
            .mutations
            .begin(kind, target, None, Snapshot::Like { prior }, now)?;
        self.state
            .likes
            .entry(entity.clone())
            .or_insert_with(LikeState::empty)
            .apply_own(&self.viewer, action);
        self.notify_like(entity);
        Ok(Some(mutation))
    }

    pub fn confirm_like(
        &mut self,
        mutation: &OptimisticMutation,
        status: LikeStatus,
        now: DateTime<Utc>,
    ) {
        self.mutations.settle(mutation);
        if let MutationTarget::Entity(entity) = &mutation.target {
            self.state
                .likes
                .entry(entity.clone())
                .or_insert_with(LikeState::empty)
                .confirm_own(&self.viewer, status, now);
            self.notify_like(entity);
        }
    }

    /// Add a placeholder comment. Its temporary id is in `temp_id`.
    pub fn begin_comment(
        &mut self,
        post: &PostId,
        parent: Option<CommentId>,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<OptimisticMutation, RingcastError> {
        let target = MutationTarget::Entity(EntityRef::post(post));
        self.mutations.check(&target, MutationKind::Comment)?;
        if body.trim().is_empty() {
            return Err(RingcastError::Precondition("comment body is empty".into()));
        }
        let temp_id = CommentId::temporary(Uuid::new_v4());
        let mutation = self.mutations.begin(
            MutationKind::Comment,
            target,
            Some(temp_id.0.clone()),
            Snapshot::CommentAdd {
                post_id: post.clone(),
                temp_id: temp_id.clone(),
            },
            now,
        )?;
        let comment = Comment {
            id: temp_id,
            post_id: post.clone(),
            parent_id: parent,
            author_id: self.viewer.clone(),
            body: body.to_string(),
            created_at: now,
        };
        self.track_post(post);
        if let Some(thread) = self.state.threads.get_mut(post)
            && thread.insert(comment.clone())
        {
            thread.total_count += 1;
        }
        self.notify(
            Topic::Comments(post.clone()),
            Notification::CommentAdded {
                post_id: post.clone(),
                comment,
            },
        );
        Ok(mutation)
    }

    pub fn confirm_comment(&mut self, mutation: &OptimisticMutation, comment: Comment) {
        self.mutations.settle(mutation);
        let Snapshot::CommentAdd { post_id, temp_id } = mutation.snapshot() else {
            return;
        };
        if let Some(thread) = self.state.threads.get_mut(post_id) {
            thread.confirm(temp_id, comment.clone());
        }
        self.notify(
            Topic::Comments(post_id.clone()),
            Notification::CommentConfirmed {
                post_id: post_id.clone(),
                temp_id: temp_id.clone(),
                comment,
            },
        );
    }

    /// Remove a comment (and its replies) optimistically.
    ///
    /// `Ok(None)` when the comment is not loaded.
    pub fn begin_delete_comment(
        &mut self,
        post: &PostId,
        comment: &CommentId,
        now: DateTime<Utc>,
    ) -> Result<Option<OptimisticMutation>, RingcastError> {
        let target = MutationTarget::Entity(EntityRef::comment(comment));
        self.mutations.check(&target, MutationKind::DeleteComment)?;
        if comment.is_temporary() {
            return Err(RingcastError::Precondition(
                "comment is still being posted".into(),
            ));
        }
        let Some(thread) = self.state.threads.get(post) else {
            return Ok(None);
        };
        let mut after = thread.clone();
        let removed = after.remove(comment);
        if removed.is_empty() {
            return Ok(None);
        }
        after.total_count = (after.total_count - removed.len() as i64).max(0);
        let mutation = self.mutations.begin(
            MutationKind::DeleteComment,
            target,
            None,
            Snapshot::CommentDelete {
                post_id: post.clone(),
                removed: removed.clone(),
                prior_total: thread.total_count,
            },
            now,
        )?;
        self.state.threads.insert(post.clone(), after);
        for c in &removed {
            self.notify_comment_removed(post, &c.id);
        }
        Ok(Some(mutation))
    }

    pub fn confirm_delete_comment(&mut self, mutation: &OptimisticMutation) {
        self.mutations.settle(mutation);
        if let Snapshot::CommentDelete { removed, .. } = mutation.snapshot() {
            for c in removed {
                self.state.likes.remove(&EntityRef::comment(&c.id));
            }
        }
    }

    /// Mark `story_ids` of `owner` viewed locally.
    ///
    /// `Ok(None)` when there is nothing new to mark.
    pub fn begin_view(
        &mut self,
        owner: &UserId,
        story_ids: &[StoryId],
        now: DateTime<Utc>,
    ) -> Result<Option<OptimisticMutation>, RingcastError> {
        let target = MutationTarget::StoryRing(owner.clone());
        self.mutations.check(&target, MutationKind::View)?;
        if story_ids.is_empty() {
            return Ok(None);
        }
        let prior = self.views.get(owner, &self.viewer);
        if owner != &self.viewer
            && story_ids
                .iter()
                .all(|id| prior.viewed_item_ids.contains(id))
        {
            return Ok(None);
        }
        let mutation = self.mutations.begin(
            MutationKind::View,
            target,
            None,
            Snapshot::View {
                owner: owner.clone(),
                viewer: self.viewer.clone(),
                prior,
            },
            now,
        )?;
        if let Err(e) = self.views.mark_viewed(owner, &self.viewer, story_ids, now) {
            self.mutations.settle(&mutation);
            return Err(e);
        }
        self.notify_ring(owner, now);
        Ok(Some(mutation))
    }

    pub fn confirm_view(&mut self, mutation: &OptimisticMutation) {
        self.mutations.settle(mutation);
    }

    /// Show a placeholder story in the viewer's own ring.
    pub fn begin_upload(
        &mut self,
        media_url: &str,
        now: DateTime<Utc>,
    ) -> Result<OptimisticMutation, RingcastError> {
        let owner = self.viewer.clone();
        let target = MutationTarget::StoryRing(owner.clone());
        self.mutations.check(&target, MutationKind::Upload)?;
        let temp_id = StoryId::temporary(Uuid::new_v4());
        let mutation = self.mutations.begin(
            MutationKind::Upload,
            target,
            Some(temp_id.0.clone()),
            Snapshot::Upload {
                owner: owner.clone(),
                temp_id: temp_id.clone(),
            },
            now,
        )?;
        self.track_ring(&owner);
        if let Some(ring) = self.state.rings.get_mut(&owner) {
            ring.insert(Story {
                id: temp_id,
                owner_id: owner.clone(),
                media_url: media_url.to_string(),
                created_at: now,
            });
        }
        self.notify_ring(&owner, now);
        Ok(mutation)
    }

    pub fn confirm_upload(&mut self, mutation: &OptimisticMutation, story: Story, now: DateTime<Utc>) {
        self.mutations.settle(mutation);
        let Snapshot::Upload { owner, temp_id } = mutation.snapshot() else {
            return;
        };
        if let Some(ring) = self.state.rings.get_mut(owner) {
            ring.remove(temp_id);
            ring.insert(story);
        }
        self.notify_ring(owner, now);
    }

    /// Remove one of the viewer's own stories optimistically.
    pub fn begin_delete_story(
        &mut self,
        story: &StoryId,
        now: DateTime<Utc>,
    ) -> Result<Option<OptimisticMutation>, RingcastError> {
        let target = MutationTarget::Entity(EntityRef::story(story));
        self.mutations.check(&target, MutationKind::DeleteStory)?;
        if story.is_temporary() {
            return Err(RingcastError::Precondition(
                "story is still being uploaded".into(),
            ));
        }
        let owner = self.viewer.clone();
        let Some(existing) = self
            .state
            .rings
            .get(&owner)
            .and_then(|r| r.stories.iter().find(|s| &s.id == story))
            .cloned()
        else {
            return Ok(None);
        };
        let mutation = self.mutations.begin(
            MutationKind::DeleteStory,
            target,
            None,
            Snapshot::StoryDelete {
                owner: owner.clone(),
                removed: existing,
            },
            now,
        )?;
        if let Some(ring) = self.state.rings.get_mut(&owner) {
            ring.remove(story);
        }
        self.notify(
            Topic::Entity(EntityRef::story(story)),
            Notification::StoryRemoved {
                owner: owner.clone(),
                story_id: story.clone(),
            },
        );
        self.notify_ring(&owner, now);
        Ok(Some(mutation))
    }

    pub fn confirm_delete_story(
        &mut self,
        mutation: &OptimisticMutation,
        remaining: i64,
        now: DateTime<Utc>,
    ) {
        self.mutations.settle(mutation);
        let Snapshot::StoryDelete { owner, removed } = mutation.snapshot() else {
            return;
        };
        self.state.likes.remove(&EntityRef::story(&removed.id));
        if remaining <= 0
            && let Some(ring) = self.state.rings.get_mut(owner)
        {
            ring.stories.retain(|s| s.id.is_temporary());
        }
        self.notify_ring(owner, now);
    }

    /// Undo a failed mutation and re-announce the restored state.
    pub fn rollback(&mut self, mutation: &OptimisticMutation, now: DateTime<Utc>) {
        self.mutations.settle(mutation);
        if let Err(e) = mutation.rollback(&mut self.state, &self.views) {
            warn!(mutation = %mutation.target, error = %e, "rollback could not restore view-state");
        }
        match mutation.snapshot() {
            Snapshot::Like { .. } => {
                if let MutationTarget::Entity(entity) = &mutation.target {
                    self.notify_like(entity);
                }
            }
            Snapshot::CommentAdd { post_id, temp_id } => {
                self.notify_comment_removed(post_id, temp_id);
            }
            Snapshot::CommentDelete {
                post_id, removed, ..
            } => {
                for comment in removed {
                    self.notify(
                        Topic::Comments(post_id.clone()),
                        Notification::CommentAdded {
                            post_id: post_id.clone(),
                            comment: comment.clone(),
                        },
                    );
                }
            }
            Snapshot::View { owner, .. }
            | Snapshot::Upload { owner, .. }
            | Snapshot::StoryDelete { owner, .. } => self.notify_ring(owner, now),
        }
        debug!(mutation = %mutation.target, kind = %mutation.kind, "mutation rolled back");
    }
}
