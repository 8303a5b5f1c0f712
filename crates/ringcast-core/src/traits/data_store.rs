// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response contract with the relational data store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RingcastError;
use crate::types::{
    Comment, CommentId, CommentPage, EntityRef, FollowStatus, LikeStatus, PostId, Story, StoryId,
    UserId, ViewStatus,
};

/// The server-side store of posts, stories, likes, comments and follows.
///
/// Every call is a suspension point; implementations must not block the
/// caller's executor.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// Stories of `owner` created after `since`.
    async fn list_active_stories(
        &self,
        owner: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Story>, RingcastError>;

    /// Records that `viewer` has seen every story in `story_ids`.
    async fn record_story_view(
        &self,
        viewer: &UserId,
        story_ids: &[StoryId],
    ) -> Result<(), RingcastError>;

    /// Flips the like of `actor` on `entity` and returns the resulting state.
    async fn toggle_like(
        &self,
        actor: &UserId,
        entity: &EntityRef,
    ) -> Result<LikeStatus, RingcastError>;

    /// One page (zero-based) of the comments of `post`.
    async fn list_comments(
        &self,
        post: &PostId,
        page: u32,
        page_size: u32,
    ) -> Result<CommentPage, RingcastError>;

    /// Follow edge from `viewer` to `owner`, if any.
    async fn get_follow_edge_status(
        &self,
        viewer: &UserId,
        owner: &UserId,
    ) -> Result<Option<FollowStatus>, RingcastError>;

    /// Current like state of `entity` as seen by `viewer`.
    async fn get_like_status(
        &self,
        viewer: &UserId,
        entity: &EntityRef,
    ) -> Result<LikeStatus, RingcastError>;

    async fn create_comment(
        &self,
        author: &UserId,
        post: &PostId,
        parent: Option<&CommentId>,
        body: &str,
    ) -> Result<Comment, RingcastError>;

    async fn delete_comment(
        &self,
        actor: &UserId,
        post: &PostId,
        comment: &CommentId,
    ) -> Result<(), RingcastError>;

    async fn create_story(&self, owner: &UserId, media_url: &str)
    -> Result<Story, RingcastError>;

    /// Deletes a story and returns how many active stories the owner has left.
    async fn delete_story(&self, owner: &UserId, story: &StoryId) -> Result<i64, RingcastError>;

    /// Which of `owner`'s stories `viewer` has seen, according to the server.
    async fn get_view_status(
        &self,
        viewer: &UserId,
        owner: &UserId,
    ) -> Result<ViewStatus, RingcastError>;
}
