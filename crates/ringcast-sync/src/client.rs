// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client session facade.
//!
//! A [`SyncClient`] owns one user's reconciliation state and drives it from
//! three sources: the event channel, a periodic poll of the data store, and
//! the user's own actions. The channel is best effort. While it is down the
//! poll keeps state converging and actions still work.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ringcast_config::model::SyncConfig;
use ringcast_core::event::{
    CommentCreate, CommentDelete, LikeUpdate, StoryDeleted, StoryUploaded, StoryView,
};
use ringcast_core::{
    ClientFrame, Comment, CommentId, CommentPage, ConnectionId, DataStore, EntityKind, EntityRef,
    EventPayload, FanoutEvent, FollowStatus, LikeAction, LikeStatus, PostId, RingcastError, Room,
    ServerFrame, Story, StoryId, UserId,
};

use crate::freshness;
use crate::optimistic::{MutationTarget, OptimisticMutation};
use crate::reconcile::ReconciliationEngine;
use crate::topics::{LocalBus, Notice, Notification, Subscription, Topic};
use crate::transport::{ChannelConnection, EventTransport};
use crate::view_state::ViewStateStore;

/// Tunables of a client session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    pub story_ttl_hours: u32,
    pub comment_page_size: u32,
    pub reconnect_backoff: Duration,
    pub reconnect_max_backoff: Duration,
    /// Upper bound on any single data store call.
    pub request_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            story_ttl_hours: freshness::DEFAULT_STORY_TTL_HOURS,
            comment_page_size: 20,
            reconnect_backoff: Duration::from_millis(1000),
            reconnect_max_backoff: Duration::from_millis(30_000),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            story_ttl_hours: config.story_ttl_hours,
            comment_page_size: config.comment_page_size,
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
            reconnect_max_backoff: Duration::from_millis(config.reconnect_max_backoff_ms),
            ..Self::default()
        }
    }
}

impl SyncOptions {
    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_backoff
            .saturating_mul(factor)
            .min(self.reconnect_max_backoff)
    }
}

/// A user action on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Like,
    Unlike,
    /// Like if not liked, unlike otherwise.
    ToggleLike,
    Comment {
        body: String,
        parent_id: Option<CommentId>,
    },
    Delete,
    View,
}

/// Result of a confirmed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Liked(LikeStatus),
    Commented(Comment),
    Deleted,
    Viewed,
    /// Local preconditions made the action unnecessary.
    NoOp,
}

/// Callbacks for [`SyncClient::subscribe_to_entity`].
pub struct EntityHandlers {
    pub on_update: Box<dyn Fn(&Notification) + Send + Sync>,
    pub on_delete: Box<dyn Fn(&Notification) + Send + Sync>,
}

/// What the story ring of one owner should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedViewState {
    pub has_unviewed: bool,
    /// Whether the viewer may open the owner's stories at all.
    pub is_following_gate: bool,
    pub active_count: usize,
}

#[derive(Default)]
struct Watched {
    likes: HashMap<EntityRef, usize>,
    posts: HashMap<PostId, usize>,
    owners: HashMap<UserId, usize>,
}

fn retain<K: Eq + Hash>(counts: &mut HashMap<K, usize>, key: K) {
    *counts.entry(key).or_default() += 1;
}

/// Returns true when the last holder let go.
fn release<K: Eq + Hash>(counts: &mut HashMap<K, usize>, key: &K) -> bool {
    match counts.get_mut(key) {
        Some(n) if *n > 1 => {
            *n -= 1;
            false
        }
        Some(_) => {
            counts.remove(key);
            true
        }
        None => false,
    }
}

struct Inner {
    viewer: UserId,
    options: SyncOptions,
    store: Arc<dyn DataStore>,
    transport: Arc<dyn EventTransport>,
    engine: Mutex<ReconciliationEngine>,
    bus: LocalBus,
    rooms: Mutex<HashMap<Room, usize>>,
    watched: Mutex<Watched>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

impl Inner {
    /// Run `f` on the engine, then publish what it queued with the lock released.
    fn engine<R>(&self, f: impl FnOnce(&mut ReconciliationEngine, DateTime<Utc>) -> R) -> R {
        let (result, notes) = {
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut *engine, Utc::now());
            (result, engine.take_notifications())
        };
        for (topic, notification) in notes {
            self.bus.publish(&topic, &notification);
        }
        result
    }

    fn watched(&self) -> std::sync::MutexGuard<'_, Watched> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms(&self) -> std::sync::MutexGuard<'_, HashMap<Room, usize>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request<T>(
        &self,
        call: impl Future<Output = Result<T, RingcastError>>,
    ) -> Result<T, RingcastError> {
        let duration = self.options.request_timeout;
        tokio::time::timeout(duration, call)
            .await
            .map_err(|_| RingcastError::Timeout { duration })?
    }

    /// Roll `mutation` back and tell the user.
    fn fail(&self, mutation: &OptimisticMutation, err: RingcastError) -> RingcastError {
        warn!(mutation = %mutation.target, kind = %mutation.kind, error = %err, "mutation failed");
        self.engine(|e, now| e.rollback(mutation, now));
        let entity = match &mutation.target {
            MutationTarget::Entity(entity) => Some(entity.clone()),
            MutationTarget::StoryRing(_) => None,
        };
        self.bus.publish(
            &Topic::Notice,
            &Notification::Notice(Notice {
                message: format!("could not complete {}: {err}", mutation.kind),
                entity,
            }),
        );
        err
    }

    /// Fan a confirmed action out to other sessions. Never fails the action.
    async fn emit(&self, payload: EventPayload) {
        if !self.connected.load(Ordering::SeqCst) {
            debug!(kind = %payload.event_type(), "event channel down, not emitting");
            return;
        }
        let event = FanoutEvent::new(payload);
        for room in event.rooms() {
            let frame = ClientFrame::Emit {
                room: room.clone(),
                event: event.clone(),
            };
            if let Err(e) = self.transport.send(frame).await {
                warn!(room = %room, kind = %event.event_type(), error = %e, "emit failed");
            }
        }
    }

    async fn join_room(&self, room: Room) {
        let first = {
            let mut rooms = self.rooms();
            let first = !rooms.contains_key(&room);
            retain(&mut rooms, room.clone());
            first
        };
        if first && self.connected.load(Ordering::SeqCst) {
            if let Err(e) = self.transport.send(ClientFrame::Join { room: room.clone() }).await {
                warn!(room = %room, error = %e, "join failed");
            }
        }
    }

    fn leave_room(self: &Arc<Self>, room: Room) {
        let last = release(&mut self.rooms(), &room);
        if !last || !self.connected.load(Ordering::SeqCst) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(self);
        handle.spawn(async move {
            if let Err(e) = inner.transport.send(ClientFrame::Leave { room: room.clone() }).await {
                debug!(room = %room, error = %e, "leave failed");
            }
        });
    }

    // ----- channel --------------------------------------------------------

    async fn on_connected(&self, conn: &ChannelConnection) {
        self.engine(|e, _| e.attach_connection(conn.id.clone()));
        self.connected.store(true, Ordering::SeqCst);
        let rooms: Vec<Room> = self.rooms().keys().cloned().collect();
        for room in rooms {
            if let Err(e) = self.transport.send(ClientFrame::Join { room: room.clone() }).await {
                warn!(room = %room, error = %e, "rejoin failed");
            }
        }
        info!(conn = %conn.id, user = %self.viewer, "event channel connected");
    }

    fn on_frame(&self, conn: &ConnectionId, frame: ServerFrame) {
        match frame {
            ServerFrame::Event { room, event } => {
                let merge = self.engine(|e, now| e.apply_event(&event, now));
                debug!(conn = %conn, room = %room, kind = %event.event_type(), ?merge, "event received");
            }
            ServerFrame::Error { message } => {
                warn!(conn = %conn, "event channel refused a frame: {message}");
            }
            ServerFrame::Joined { room } => debug!(conn = %conn, room = %room, "joined"),
            ServerFrame::Left { room } => debug!(conn = %conn, room = %room, "left"),
            ServerFrame::Welcome { .. } | ServerFrame::Pong => {}
        }
    }

    async fn run_channel(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.transport.reconnect().await {
                Ok(mut conn) => {
                    attempt = 0;
                    self.on_connected(&conn).await;
                    // Nothing is delivered across a gap; catch up right away.
                    self.poll_once().await;
                    loop {
                        let frame = tokio::select! {
                            _ = self.shutdown.cancelled() => None,
                            frame = conn.inbound.recv() => frame,
                        };
                        match frame {
                            Some(frame) => self.on_frame(&conn.id, frame),
                            None => break,
                        }
                    }
                    self.connected.store(false, Ordering::SeqCst);
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    warn!(conn = %conn.id, "event channel lost, polling only");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "event channel connect failed");
                }
            }
            let delay = self.options.backoff(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.transport.disconnect().await;
        debug!(user = %self.viewer, "channel pump stopped");
    }

    // ----- polling --------------------------------------------------------

    async fn run_poll(self: Arc<Self>) {
        let period = self.options.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
        debug!(user = %self.viewer, "poll loop stopped");
    }

    async fn poll_once(&self) {
        let (likes, posts, owners) = {
            let watched = self.watched();
            (
                watched.likes.keys().cloned().collect::<Vec<_>>(),
                watched.posts.keys().cloned().collect::<Vec<_>>(),
                watched.owners.keys().cloned().collect::<Vec<_>>(),
            )
        };
        for entity in likes {
            if let Err(e) = self.refresh_like(&entity).await {
                warn!(entity = %entity, error = %e, "like poll failed");
            }
        }
        for post in posts {
            if let Err(e) = self.refresh_comments(&post).await {
                warn!(post = %post, error = %e, "comment poll failed");
            }
        }
        for owner in owners {
            if let Err(e) = self.refresh_ring(&owner).await {
                warn!(owner = %owner, error = %e, "story poll failed");
            }
        }
    }

    async fn refresh_like(&self, entity: &EntityRef) -> Result<(), RingcastError> {
        let fetched_at = Utc::now();
        let status = self
            .request(self.store.get_like_status(&self.viewer, entity))
            .await?;
        self.engine(|e, _| e.merge_like_status(entity, status, fetched_at));
        Ok(())
    }

    /// Refetch every loaded page of `post` and replace the thread.
    async fn refresh_comments(&self, post: &PostId) -> Result<(), RingcastError> {
        let fetched_at = Utc::now();
        let pages = self
            .engine(|e, _| e.state().threads.get(post).map(|t| t.pages_loaded))
            .unwrap_or(0)
            .max(1);
        let page_size = self.options.comment_page_size;
        let mut merged = CommentPage {
            items: Vec::new(),
            has_more: false,
            total_count: 0,
        };
        for page in 0..pages {
            let next = self
                .request(self.store.list_comments(post, page, page_size))
                .await?;
            merged.items.extend(next.items);
            merged.has_more = next.has_more;
            merged.total_count = next.total_count;
            if !next.has_more {
                break;
            }
        }
        self.engine(|e, _| e.merge_comment_pages(post, merged, pages, fetched_at));
        Ok(())
    }

    async fn refresh_ring(&self, owner: &UserId) -> Result<(), RingcastError> {
        let fetched_at = Utc::now();
        let since = freshness::active_since(fetched_at, self.options.story_ttl_hours);
        let stories = self
            .request(self.store.list_active_stories(owner, since))
            .await?;
        self.engine(|e, now| e.merge_stories(owner, stories, fetched_at, now));
        Ok(())
    }

    /// Merge server view truth, after local storage has already been read.
    async fn refresh_view_status(&self, owner: &UserId) -> Result<(), RingcastError> {
        let status = self
            .request(self.store.get_view_status(&self.viewer, owner))
            .await?;
        self.engine(|e, now| e.merge_view_status(owner, &status, now));
        Ok(())
    }
}

/// One user's client session.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("viewer", &self.inner.viewer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SyncClient {
    pub fn new(
        viewer: UserId,
        store: Arc<dyn DataStore>,
        transport: Arc<dyn EventTransport>,
        views: ViewStateStore,
        options: SyncOptions,
    ) -> Self {
        let engine = ReconciliationEngine::new(viewer.clone(), views, options.story_ttl_hours);
        Self {
            inner: Arc::new(Inner {
                viewer,
                options,
                store,
                transport,
                engine: Mutex::new(engine),
                bus: LocalBus::new(),
                rooms: Mutex::new(HashMap::new()),
                watched: Mutex::new(Watched::default()),
                connected: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sweep stale view-state, then start the channel pump and the poll loop.
    pub fn start(&self) {
        let swept = self.inner.engine(|e, now| {
            let ttl = e.story_ttl_hours();
            e.views().sweep_stale(ttl, now)
        });
        if let Err(e) = swept {
            warn!(error = %e, "view-state sweep failed");
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(Arc::clone(&self.inner).run_channel()));
        tasks.push(tokio::spawn(Arc::clone(&self.inner).run_poll()));
        info!(user = %self.inner.viewer, "sync client started");
    }

    /// Stop background tasks and close the channel.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }
        self.inner.transport.disconnect().await;
    }

    pub fn viewer(&self) -> &UserId {
        &self.inner.viewer
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The local bus, for topics not tied to one entity (flags, notices).
    pub fn bus(&self) -> &LocalBus {
        &self.inner.bus
    }

    /// Poll every watched entity now.
    pub async fn poll_now(&self) {
        self.inner.poll_once().await;
    }

    // ----- reads ----------------------------------------------------------

    pub fn like_status(&self, entity: &EntityRef) -> Option<LikeStatus> {
        self.inner
            .engine(|e, _| e.state().likes.get(entity).map(|l| l.status()))
    }

    pub fn comments(&self, post: &PostId) -> Vec<Comment> {
        self.inner.engine(|e, _| {
            e.state()
                .threads
                .get(post)
                .map(|t| t.items.clone())
                .unwrap_or_default()
        })
    }

    pub fn comment_count(&self, post: &PostId) -> Option<i64> {
        self.inner
            .engine(|e, _| e.state().threads.get(post).map(|t| t.total_count))
    }

    pub fn active_stories(&self, owner: &UserId) -> Vec<Story> {
        self.inner
            .engine(|e, now| e.ring_view(owner, now).map(|v| v.active).unwrap_or_default())
    }

    pub fn feature_flag(&self, name: &str) -> Option<bool> {
        self.inner.engine(|e, _| e.state().flags.get(name).copied())
    }

    pub fn pending_mutations(&self) -> usize {
        self.inner.engine(|e, _| e.mutations().len())
    }

    /// Ring state of `owner` for this viewer.
    ///
    /// Uses locally persisted view-state first; stories are fetched only if
    /// the ring has not been loaded in this session.
    pub async fn derived_view_state(
        &self,
        owner: &UserId,
    ) -> Result<DerivedViewState, RingcastError> {
        let inner = &self.inner;
        let loaded = inner.engine(|e, _| e.state().rings.contains_key(owner));
        if !loaded && let Err(e) = inner.refresh_ring(owner).await {
            warn!(owner = %owner, error = %e, "story fetch failed, ring shown as empty");
        }
        let is_following_gate = if owner == &inner.viewer {
            true
        } else {
            inner
                .request(inner.store.get_follow_edge_status(&inner.viewer, owner))
                .await?
                == Some(FollowStatus::Accepted)
        };
        let view = inner.engine(|e, now| e.ring_view(owner, now));
        Ok(DerivedViewState {
            has_unviewed: view.as_ref().is_some_and(|v| v.has_unviewed),
            is_following_gate,
            active_count: view.map_or(0, |v| v.active.len()),
        })
    }

    // ----- subscriptions --------------------------------------------------

    /// Listen to one entity. Its like state is polled while subscribed.
    pub fn subscribe_to_entity(
        &self,
        kind: EntityKind,
        id: impl Into<String>,
        handlers: EntityHandlers,
    ) -> EntitySubscription {
        let entity = EntityRef {
            kind,
            id: id.into(),
        };
        retain(&mut self.inner.watched().likes, entity.clone());
        let EntityHandlers {
            on_update,
            on_delete,
        } = handlers;
        let subscription = self
            .inner
            .bus
            .subscribe(Topic::Entity(entity.clone()), move |n| {
                if n.is_delete() {
                    on_delete(n)
                } else {
                    on_update(n)
                }
            });
        EntitySubscription {
            inner: Arc::downgrade(&self.inner),
            entity,
            subscription: Some(subscription),
        }
    }

    /// Show a post: join its room, load its first page and like state.
    pub async fn open_post(&self, post: &PostId) -> ViewScope {
        let inner = &self.inner;
        inner.engine(|e, _| e.track_post(post));
        {
            let mut watched = inner.watched();
            retain(&mut watched.posts, post.clone());
            retain(&mut watched.likes, EntityRef::post(post));
        }
        let room = Room::Post(post.clone());
        inner.join_room(room.clone()).await;

        let entity = EntityRef::post(post);
        let (comments, like) = futures::join!(
            inner.refresh_comments(post),
            inner.refresh_like(&entity)
        );
        if let Err(e) = comments.and(like) {
            warn!(post = %post, error = %e, "mount fetch failed, waiting for poll");
        }
        ViewScope {
            inner: Arc::downgrade(&self.inner),
            room: Some(room),
            subject: ScopeSubject::Post(post.clone()),
            subscriptions: Vec::new(),
        }
    }

    /// Show an owner's stories: hydrate from local view-state, then
    /// reconcile with the server.
    pub async fn open_story_ring(&self, owner: &UserId) -> ViewScope {
        let inner = &self.inner;
        inner.engine(|e, _| e.track_ring(owner));
        retain(&mut inner.watched().owners, owner.clone());
        let (stories, views) = futures::join!(
            inner.refresh_ring(owner),
            inner.refresh_view_status(owner)
        );
        if let Err(e) = stories.and(views) {
            warn!(owner = %owner, error = %e, "mount fetch failed, waiting for poll");
        }
        ViewScope {
            inner: Arc::downgrade(&self.inner),
            room: None,
            subject: ScopeSubject::Ring(owner.clone()),
            subscriptions: Vec::new(),
        }
    }

    /// Fetch the next page of a post's comments.
    pub async fn load_more_comments(&self, post: &PostId) -> Result<(), RingcastError> {
        let inner = &self.inner;
        let Some(page) = inner.engine(|e, _| {
            e.state()
                .threads
                .get(post)
                .filter(|t| t.has_more)
                .map(|t| t.pages_loaded)
        }) else {
            return Ok(());
        };
        let next = inner
            .request(
                inner
                    .store
                    .list_comments(post, page, inner.options.comment_page_size),
            )
            .await?;
        inner.engine(|e, _| e.append_comment_page(post, next));
        Ok(())
    }

    // ----- actions --------------------------------------------------------

    /// Apply `action` to an entity locally, confirm it with the data store,
    /// then fan it out. A failure rolls local state back, publishes a
    /// [`Notice`] and returns the error.
    pub async fn perform_optimistic_action(
        &self,
        kind: EntityKind,
        id: &str,
        action: Action,
    ) -> Result<ActionOutcome, RingcastError> {
        let entity = EntityRef {
            kind,
            id: id.to_string(),
        };
        match (kind, action) {
            (_, Action::Like) => self.like(entity, Some(LikeAction::Like)).await,
            (_, Action::Unlike) => self.like(entity, Some(LikeAction::Unlike)).await,
            (_, Action::ToggleLike) => self.like(entity, None).await,
            (EntityKind::Post, Action::Comment { body, parent_id }) => {
                self.comment(&PostId::new(id), parent_id, &body).await
            }
            (EntityKind::Comment, Action::Delete) => {
                self.delete_comment(&CommentId::new(id)).await
            }
            (EntityKind::Story, Action::Delete) => self.delete_story(&StoryId::new(id)).await,
            (EntityKind::Story, Action::View) => {
                let story = StoryId::new(id);
                let owner = self
                    .inner
                    .engine(|e, _| e.state().owner_of_story(&story).cloned());
                match owner {
                    Some(owner) => self.view(&owner, vec![story]).await,
                    None => Ok(ActionOutcome::NoOp),
                }
            }
            (kind, action) => Err(RingcastError::Precondition(format!(
                "{action:?} is not supported on a {kind}"
            ))),
        }
    }

    /// Mark every active story of `owner` viewed.
    pub async fn mark_ring_viewed(&self, owner: &UserId) -> Result<ActionOutcome, RingcastError> {
        let ids: Vec<StoryId> = self
            .active_stories(owner)
            .into_iter()
            .map(|s| s.id)
            .filter(|id| !id.is_temporary())
            .collect();
        self.view(owner, ids).await
    }

    /// Upload a story; a placeholder shows in the viewer's ring meanwhile.
    pub async fn upload_story(&self, media_url: &str) -> Result<Story, RingcastError> {
        let inner = &self.inner;
        let mutation = inner.engine(|e, now| e.begin_upload(media_url, now))?;
        match inner
            .request(inner.store.create_story(&inner.viewer, media_url))
            .await
        {
            Ok(story) => {
                inner.engine(|e, now| e.confirm_upload(&mutation, story.clone(), now));
                inner
                    .emit(EventPayload::StoryUploaded(StoryUploaded {
                        owner_id: inner.viewer.clone(),
                        story: story.clone(),
                    }))
                    .await;
                Ok(story)
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }

    async fn like(
        &self,
        entity: EntityRef,
        wanted: Option<LikeAction>,
    ) -> Result<ActionOutcome, RingcastError> {
        let inner = &self.inner;
        let (action, begun) = inner.engine(|e, now| {
            let action = wanted.unwrap_or_else(|| {
                if e.state().likes.get(&entity).is_some_and(|l| l.liked) {
                    LikeAction::Unlike
                } else {
                    LikeAction::Like
                }
            });
            (action, e.begin_like(&entity, action, now))
        });
        let Some(mutation) = begun? else {
            return Ok(ActionOutcome::NoOp);
        };
        let committed_at = Utc::now();
        match inner
            .request(inner.store.toggle_like(&inner.viewer, &entity))
            .await
        {
            Ok(status) => {
                let (post_id, owner_id) = inner.engine(|e, now| {
                    e.confirm_like(&mutation, status, now);
                    let state = e.state();
                    let post_id = match entity.kind {
                        EntityKind::Comment => {
                            state.post_of_comment(&CommentId::new(&*entity.id)).cloned()
                        }
                        _ => None,
                    };
                    let owner_id = match entity.kind {
                        EntityKind::Story => {
                            state.owner_of_story(&StoryId::new(&*entity.id)).cloned()
                        }
                        _ => None,
                    };
                    (post_id, owner_id)
                });
                inner
                    .emit(EventPayload::LikeUpdate(LikeUpdate {
                        entity_kind: entity.kind,
                        entity_id: entity.id.clone(),
                        actor_id: inner.viewer.clone(),
                        action: if status.liked {
                            LikeAction::Like
                        } else {
                            LikeAction::Unlike
                        },
                        post_id,
                        owner_id,
                        committed_at: Some(committed_at),
                    }))
                    .await;
                if status.liked != action.liked() {
                    debug!(
                        %entity,
                        requested = %action,
                        liked = status.liked,
                        "like reversed by server"
                    );
                    inner.bus.publish(
                        &Topic::Notice,
                        &Notification::Notice(Notice {
                            message: format!("{action} was reversed: the server had a newer state"),
                            entity: Some(entity.clone()),
                        }),
                    );
                }
                Ok(ActionOutcome::Liked(status))
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }

    async fn comment(
        &self,
        post: &PostId,
        parent: Option<CommentId>,
        body: &str,
    ) -> Result<ActionOutcome, RingcastError> {
        let inner = &self.inner;
        let mutation = inner.engine(|e, now| e.begin_comment(post, parent.clone(), body, now))?;
        match inner
            .request(
                inner
                    .store
                    .create_comment(&inner.viewer, post, parent.as_ref(), body),
            )
            .await
        {
            Ok(comment) => {
                inner.engine(|e, _| e.confirm_comment(&mutation, comment.clone()));
                inner
                    .emit(EventPayload::CommentCreate(CommentCreate {
                        post_id: post.clone(),
                        parent_id: comment.parent_id.clone(),
                        comment: comment.clone(),
                    }))
                    .await;
                Ok(ActionOutcome::Commented(comment))
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }

    async fn delete_comment(&self, comment: &CommentId) -> Result<ActionOutcome, RingcastError> {
        let inner = &self.inner;
        type Begun = Option<(OptimisticMutation, PostId, Option<CommentId>)>;
        let begun = inner.engine(|e, now| -> Result<Begun, RingcastError> {
            let Some(post) = e.state().post_of_comment(comment).cloned() else {
                return Ok(None);
            };
            let parent = e
                .state()
                .threads
                .get(&post)
                .and_then(|t| t.get(comment))
                .and_then(|c| c.parent_id.clone());
            Ok(e
                .begin_delete_comment(&post, comment, now)?
                .map(|m| (m, post, parent)))
        })?;
        let Some((mutation, post, parent_id)) = begun else {
            return Ok(ActionOutcome::NoOp);
        };
        match inner
            .request(inner.store.delete_comment(&inner.viewer, &post, comment))
            .await
        {
            Ok(()) => {
                inner.engine(|e, _| e.confirm_delete_comment(&mutation));
                inner
                    .emit(EventPayload::CommentDelete(CommentDelete {
                        post_id: post,
                        comment_id: comment.clone(),
                        parent_id,
                        actor_id: inner.viewer.clone(),
                    }))
                    .await;
                Ok(ActionOutcome::Deleted)
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }

    async fn delete_story(&self, story: &StoryId) -> Result<ActionOutcome, RingcastError> {
        let inner = &self.inner;
        let Some(mutation) = inner.engine(|e, now| e.begin_delete_story(story, now))? else {
            return Ok(ActionOutcome::NoOp);
        };
        match inner
            .request(inner.store.delete_story(&inner.viewer, story))
            .await
        {
            Ok(remaining) => {
                inner.engine(|e, now| e.confirm_delete_story(&mutation, remaining, now));
                inner
                    .emit(EventPayload::StoryDeleted(StoryDeleted {
                        owner_id: inner.viewer.clone(),
                        story_id: story.clone(),
                        remaining_count: remaining,
                    }))
                    .await;
                Ok(ActionOutcome::Deleted)
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }

    async fn view(
        &self,
        owner: &UserId,
        story_ids: Vec<StoryId>,
    ) -> Result<ActionOutcome, RingcastError> {
        let inner = &self.inner;
        let Some(mutation) = inner.engine(|e, now| e.begin_view(owner, &story_ids, now))? else {
            return Ok(ActionOutcome::NoOp);
        };
        match inner
            .request(inner.store.record_story_view(&inner.viewer, &story_ids))
            .await
        {
            Ok(()) => {
                inner.engine(|e, _| e.confirm_view(&mutation));
                for story_id in story_ids {
                    inner
                        .emit(EventPayload::StoryView(StoryView {
                            owner_id: owner.clone(),
                            story_id,
                            viewer_id: inner.viewer.clone(),
                        }))
                        .await;
                }
                Ok(ActionOutcome::Viewed)
            }
            Err(err) => Err(inner.fail(&mutation, err)),
        }
    }
}

/// Handle returned by [`SyncClient::subscribe_to_entity`].
///
/// Dropping it unsubscribes.
pub struct EntitySubscription {
    inner: Weak<Inner>,
    entity: EntityRef,
    subscription: Option<Subscription>,
}

impl EntitySubscription {
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EntitySubscription {
    fn drop(&mut self) {
        self.subscription.take();
        if let Some(inner) = self.inner.upgrade() {
            release(&mut inner.watched().likes, &self.entity);
        }
    }
}

enum ScopeSubject {
    Post(PostId),
    Ring(UserId),
}

/// A mounted view: a post detail or a story ring.
///
/// Handlers registered through the scope live exactly as long as it does.
/// Closing (or dropping) the scope leaves its room and stops polling for it.
pub struct ViewScope {
    inner: Weak<Inner>,
    room: Option<Room>,
    subject: ScopeSubject,
    subscriptions: Vec<Subscription>,
}

impl ViewScope {
    /// Listen to `topic` for as long as this scope is open.
    pub fn on(&mut self, topic: Topic, handler: impl Fn(&Notification) + Send + Sync + 'static) {
        if let Some(inner) = self.inner.upgrade() {
            self.subscriptions.push(inner.bus.subscribe(topic, handler));
        }
    }

    /// The natural topic of this scope: comments of a post, or a story ring.
    pub fn topic(&self) -> Topic {
        match &self.subject {
            ScopeSubject::Post(post) => Topic::Comments(post.clone()),
            ScopeSubject::Ring(owner) => Topic::StoryRing(owner.clone()),
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.subscriptions.clear();
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match &self.subject {
            ScopeSubject::Post(post) => {
                let last = {
                    let mut watched = inner.watched();
                    release(&mut watched.likes, &EntityRef::post(post));
                    release(&mut watched.posts, post)
                };
                if last {
                    inner.engine(|e, _| e.forget_post(post));
                }
            }
            ScopeSubject::Ring(owner) => {
                if release(&mut inner.watched().owners, owner) {
                    inner.engine(|e, _| e.forget_ring(owner));
                }
            }
        }
        if let Some(room) = self.room.take() {
            inner.leave_room(room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let options = SyncOptions {
            reconnect_backoff: Duration::from_millis(100),
            reconnect_max_backoff: Duration::from_millis(1000),
            ..SyncOptions::default()
        };
        assert_eq!(options.backoff(0), Duration::from_millis(100));
        assert_eq!(options.backoff(1), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(800));
        assert_eq!(options.backoff(4), Duration::from_millis(1000));
        assert_eq!(options.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn options_follow_sync_config() {
        let config = SyncConfig {
            poll_interval_secs: 30,
            story_ttl_hours: 12,
            comment_page_size: 50,
            reconnect_backoff_ms: 250,
            reconnect_max_backoff_ms: 5000,
        };
        let options = SyncOptions::from(&config);
        assert_eq!(options.poll_interval, Duration::from_secs(30));
        assert_eq!(options.story_ttl_hours, 12);
        assert_eq!(options.comment_page_size, 50);
        assert_eq!(options.reconnect_max_backoff, Duration::from_millis(5000));
    }

    #[test]
    fn watch_counts_release_on_last_holder() {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        retain(&mut counts, "p");
        retain(&mut counts, "p");
        assert!(!release(&mut counts, &"p"));
        assert!(release(&mut counts, &"p"));
        assert!(!release(&mut counts, &"p"));
    }
}
