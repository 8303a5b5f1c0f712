// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory data store for deterministic tests.
//!
//! `MockDataStore` implements [`DataStore`] over a small social graph held in
//! memory. Tests can inject failures, hold mutation responses in flight, and
//! shift the store's clock.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use ringcast_core::{
    Comment, CommentId, CommentPage, DataStore, EntityRef, FollowStatus, LikeStatus, PostId,
    RingcastError, Story, StoryId, UserId, ViewStatus,
};

#[derive(Default)]
struct Graph {
    next_id: u64,
    stories: Vec<Story>,
    likes: HashMap<EntityRef, HashSet<UserId>>,
    comments: HashMap<PostId, Vec<Comment>>,
    follows: HashMap<(UserId, UserId), FollowStatus>,
    views: HashMap<UserId, HashMap<StoryId, DateTime<Utc>>>,
}

impl Graph {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn like_status(&self, viewer: &UserId, entity: &EntityRef) -> LikeStatus {
        let likers = self.likes.get(entity);
        LikeStatus {
            liked: likers.is_some_and(|l| l.contains(viewer)),
            count: likers.map_or(0, |l| l.len() as i64),
        }
    }
}

/// A mock data store with failure injection.
pub struct MockDataStore {
    graph: Mutex<Graph>,
    clock_offset: Mutex<Duration>,
    fail_mutations: Mutex<bool>,
    fail_reads: Mutex<bool>,
    gate: watch::Sender<bool>,
}

impl Default for MockDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDataStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            graph: Mutex::new(Graph::default()),
            clock_offset: Mutex::new(Duration::zero()),
            fail_mutations: Mutex::new(false),
            fail_reads: Mutex::new(false),
            gate,
        }
    }

    fn graph(&self) -> std::sync::MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The store's notion of the current time.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance_clock(&self, by: Duration) {
        *self.clock_offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Make every mutation fail with [`RingcastError::Rejected`].
    pub fn set_fail_mutations(&self, fail: bool) {
        *self.fail_mutations.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Make every read fail as if the store were unreachable.
    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Keep mutation responses from returning until [`release_responses`](Self::release_responses).
    ///
    /// Successful mutations are applied to the graph before they wait.
    pub fn hold_responses(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_responses(&self) {
        self.gate.send_replace(true);
    }

    pub fn set_follow(&self, viewer: &UserId, owner: &UserId, status: Option<FollowStatus>) {
        let key = (viewer.clone(), owner.clone());
        let mut graph = self.graph();
        match status {
            Some(status) => graph.follows.insert(key, status),
            None => graph.follows.remove(&key),
        };
    }

    /// Add a story created `age` ago, without any fan-out.
    pub fn insert_story(&self, owner: &UserId, age: Duration) -> Story {
        let created_at = self.now() - age;
        let mut graph = self.graph();
        let story = Story {
            id: StoryId::new(graph.next_id("s")),
            owner_id: owner.clone(),
            media_url: "https://cdn.example/story.jpg".into(),
            created_at,
        };
        graph.stories.push(story.clone());
        story
    }

    /// Add a comment, without any fan-out.
    pub fn insert_comment(&self, post: &PostId, author: &UserId, body: &str) -> Comment {
        let created_at = self.now();
        let mut graph = self.graph();
        let comment = Comment {
            id: CommentId::new(graph.next_id("c")),
            post_id: post.clone(),
            parent_id: None,
            author_id: author.clone(),
            body: body.into(),
            created_at,
        };
        graph
            .comments
            .entry(post.clone())
            .or_default()
            .push(comment.clone());
        comment
    }

    pub fn like_count(&self, entity: &EntityRef) -> i64 {
        self.graph().likes.get(entity).map_or(0, |l| l.len() as i64)
    }

    pub fn comment_count(&self, post: &PostId) -> usize {
        self.graph().comments.get(post).map_or(0, Vec::len)
    }

    fn check_read(&self) -> Result<(), RingcastError> {
        if *self.fail_reads.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(RingcastError::data_store("store unreachable"));
        }
        Ok(())
    }

    fn check_mutation(&self) -> Result<(), RingcastError> {
        if *self.fail_mutations.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(RingcastError::Rejected {
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    /// Resolve a mutation once the gate is open.
    async fn respond<T>(&self, result: Result<T, RingcastError>) -> Result<T, RingcastError> {
        let mut open = self.gate.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(RingcastError::Internal("mock store dropped".into()));
        }
        result
    }
}

#[async_trait]
impl DataStore for MockDataStore {
    async fn list_active_stories(
        &self,
        owner: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Story>, RingcastError> {
        self.check_read()?;
        let mut stories: Vec<Story> = self
            .graph()
            .stories
            .iter()
            .filter(|s| &s.owner_id == owner && s.created_at > since)
            .cloned()
            .collect();
        stories.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(stories)
    }

    async fn record_story_view(
        &self,
        viewer: &UserId,
        story_ids: &[StoryId],
    ) -> Result<(), RingcastError> {
        let result = self.check_mutation().map(|()| {
            let now = self.now();
            let mut graph = self.graph();
            let seen = graph.views.entry(viewer.clone()).or_default();
            for id in story_ids {
                seen.insert(id.clone(), now);
            }
        });
        self.respond(result).await
    }

    async fn toggle_like(
        &self,
        actor: &UserId,
        entity: &EntityRef,
    ) -> Result<LikeStatus, RingcastError> {
        let result = self.check_mutation().map(|()| {
            let mut graph = self.graph();
            let likers = graph.likes.entry(entity.clone()).or_default();
            if !likers.remove(actor) {
                likers.insert(actor.clone());
            }
            graph.like_status(actor, entity)
        });
        self.respond(result).await
    }

    async fn list_comments(
        &self,
        post: &PostId,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, RingcastError> {
        self.check_read()?;
        let graph = self.graph();
        let all = graph.comments.get(post).cloned().unwrap_or_default();
        let start = (page as usize).saturating_mul(page_size as usize);
        let items: Vec<Comment> = all.iter().skip(start).take(page_size as usize).cloned().collect();
        Ok(CommentPage {
            has_more: start + items.len() < all.len(),
            total_count: all.len() as i64,
            items,
        })
    }

    async fn get_follow_edge_status(
        &self,
        viewer: &UserId,
        owner: &UserId,
    ) -> Result<Option<FollowStatus>, RingcastError> {
        self.check_read()?;
        Ok(self
            .graph()
            .follows
            .get(&(viewer.clone(), owner.clone()))
            .copied())
    }

    async fn get_like_status(
        &self,
        viewer: &UserId,
        entity: &EntityRef,
    ) -> Result<LikeStatus, RingcastError> {
        self.check_read()?;
        Ok(self.graph().like_status(viewer, entity))
    }

    async fn create_comment(
        &self,
        author: &UserId,
        post: &PostId,
        parent: Option<&CommentId>,
        body: &str,
    ) -> Result<Comment, RingcastError> {
        let result = self.check_mutation().and_then(|()| {
            let created_at = self.now();
            let mut graph = self.graph();
            if let Some(parent) = parent {
                let exists = graph
                    .comments
                    .get(post)
                    .is_some_and(|list| list.iter().any(|c| &c.id == parent));
                if !exists {
                    return Err(RingcastError::Rejected {
                        message: format!("parent comment {parent} not found"),
                    });
                }
            }
            let comment = Comment {
                id: CommentId::new(graph.next_id("c")),
                post_id: post.clone(),
                parent_id: parent.cloned(),
                author_id: author.clone(),
                body: body.to_string(),
                created_at,
            };
            graph
                .comments
                .entry(post.clone())
                .or_default()
                .push(comment.clone());
            Ok(comment)
        });
        self.respond(result).await
    }

    async fn delete_comment(
        &self,
        actor: &UserId,
        post: &PostId,
        comment: &CommentId,
    ) -> Result<(), RingcastError> {
        let result = self.check_mutation().and_then(|()| {
            let mut graph = self.graph();
            let list = graph.comments.entry(post.clone()).or_default();
            let Some(target) = list.iter().find(|c| &c.id == comment) else {
                return Err(RingcastError::Rejected {
                    message: format!("comment {comment} not found"),
                });
            };
            if &target.author_id != actor {
                return Err(RingcastError::Rejected {
                    message: "only the author may delete a comment".into(),
                });
            }
            let mut doomed = HashSet::from([comment.clone()]);
            loop {
                let before = doomed.len();
                for c in list.iter() {
                    if c.parent_id.as_ref().is_some_and(|p| doomed.contains(p)) {
                        doomed.insert(c.id.clone());
                    }
                }
                if doomed.len() == before {
                    break;
                }
            }
            list.retain(|c| !doomed.contains(&c.id));
            Ok(())
        });
        self.respond(result).await
    }

    async fn create_story(&self, owner: &UserId, media_url: &str) -> Result<Story, RingcastError> {
        let result = self.check_mutation().map(|()| {
            let created_at = self.now();
            let mut graph = self.graph();
            let story = Story {
                id: StoryId::new(graph.next_id("s")),
                owner_id: owner.clone(),
                media_url: media_url.to_string(),
                created_at,
            };
            graph.stories.push(story.clone());
            story
        });
        self.respond(result).await
    }

    async fn delete_story(&self, owner: &UserId, story: &StoryId) -> Result<i64, RingcastError> {
        let result = self.check_mutation().and_then(|()| {
            let now = self.now();
            let mut graph = self.graph();
            let before = graph.stories.len();
            graph
                .stories
                .retain(|s| !(&s.id == story && &s.owner_id == owner));
            if graph.stories.len() == before {
                return Err(RingcastError::Rejected {
                    message: format!("story {story} not found"),
                });
            }
            let since = now - Duration::hours(24);
            Ok(graph
                .stories
                .iter()
                .filter(|s| &s.owner_id == owner && s.created_at > since)
                .count() as i64)
        });
        self.respond(result).await
    }

    async fn get_view_status(
        &self,
        viewer: &UserId,
        owner: &UserId,
    ) -> Result<ViewStatus, RingcastError> {
        self.check_read()?;
        let graph = self.graph();
        let owned: HashSet<&StoryId> = graph
            .stories
            .iter()
            .filter(|s| &s.owner_id == owner)
            .map(|s| &s.id)
            .collect();
        let mut status = ViewStatus::default();
        if let Some(seen) = graph.views.get(viewer) {
            for (id, at) in seen {
                if owned.contains(id) {
                    status.viewed_story_ids.push(id.clone());
                    status.last_viewed_at = status.last_viewed_at.max(Some(*at));
                }
            }
        }
        status.viewed_story_ids.sort();
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggle_like_flips_and_counts() {
        let store = MockDataStore::new();
        let entity = EntityRef::post(&PostId::new("P"));
        let a = UserId::new("a");
        let b = UserId::new("b");
        assert_eq!(
            store.toggle_like(&a, &entity).await.unwrap(),
            LikeStatus { liked: true, count: 1 }
        );
        store.toggle_like(&b, &entity).await.unwrap();
        assert_eq!(
            store.toggle_like(&a, &entity).await.unwrap(),
            LikeStatus { liked: false, count: 1 }
        );
    }

    #[tokio::test]
    async fn injected_failure_leaves_graph_untouched() {
        let store = MockDataStore::new();
        let entity = EntityRef::post(&PostId::new("P"));
        store.set_fail_mutations(true);
        let err = store.toggle_like(&UserId::new("a"), &entity).await.unwrap_err();
        assert!(err.is_mutation_failure());
        assert_eq!(store.like_count(&entity), 0);
    }

    #[tokio::test]
    async fn comments_page_and_delete_with_replies() {
        let store = MockDataStore::new();
        let post = PostId::new("P");
        let a = UserId::new("a");
        let root = store.create_comment(&a, &post, None, "root").await.unwrap();
        store.create_comment(&a, &post, Some(&root.id), "reply").await.unwrap();
        store.create_comment(&a, &post, None, "other").await.unwrap();

        let first = store.list_comments(&post, 0, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);
        assert_eq!(first.total_count, 3);

        store.delete_comment(&a, &post, &root.id).await.unwrap();
        assert_eq!(store.comment_count(&post), 1);
    }

    #[tokio::test]
    async fn active_stories_respect_since() {
        let store = MockDataStore::new();
        let owner = UserId::new("o");
        store.insert_story(&owner, Duration::hours(23));
        store.insert_story(&owner, Duration::hours(25));
        let since = store.now() - Duration::hours(24);
        assert_eq!(store.list_active_stories(&owner, since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn view_status_only_covers_owner_stories() {
        let store = MockDataStore::new();
        let owner = UserId::new("o");
        let other = UserId::new("x");
        let viewer = UserId::new("v");
        let mine = store.insert_story(&owner, Duration::hours(1));
        let theirs = store.insert_story(&other, Duration::hours(1));
        store
            .record_story_view(&viewer, &[mine.id.clone(), theirs.id])
            .await
            .unwrap();
        let status = store.get_view_status(&viewer, &owner).await.unwrap();
        assert_eq!(status.viewed_story_ids, vec![mine.id]);
        assert!(status.last_viewed_at.is_some());
    }
}
