// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory derived state held by one client session.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use ringcast_core::{
    Comment, CommentId, EntityRef, LikeAction, LikeStatus, PostId, Story, StoryId, UserId,
};

/// Like flag and counter of one entity.
///
/// `baseline_at` is when the last authoritative value (poll, mount fetch or
/// confirmed mutation) was taken; deltas stamped at or before it are already
/// in `count`. `known` remembers each actor's last applied action after the
/// baseline so a redelivered event is not counted twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: i64,
    pub baseline_at: Option<DateTime<Utc>>,
    known: HashMap<UserId, bool>,
}

impl LikeState {
    /// Unknown entity: not liked, nothing counted yet.
    pub fn empty() -> Self {
        Self {
            liked: false,
            count: 0,
            baseline_at: None,
            known: HashMap::new(),
        }
    }

    pub fn from_status(status: LikeStatus, at: DateTime<Utc>) -> Self {
        let mut state = Self::empty();
        state.replace(status, at);
        state
    }

    /// Take an authoritative value.
    pub fn replace(&mut self, status: LikeStatus, at: DateTime<Utc>) {
        self.liked = status.liked;
        self.count = status.count.max(0);
        self.baseline_at = Some(at);
        self.known.clear();
    }

    /// Apply `actor`'s `action` stamped `at`. Returns whether anything changed.
    ///
    /// `is_viewer` is set when `actor` is the local user acting from another
    /// session; only then does the `liked` flag follow the event.
    pub fn apply_delta(
        &mut self,
        actor: &UserId,
        action: LikeAction,
        at: DateTime<Utc>,
        is_viewer: bool,
    ) -> bool {
        if self.baseline_at.is_some_and(|baseline| at <= baseline) {
            return false;
        }
        if self.known.get(actor) == Some(&action.liked()) {
            return false;
        }
        if is_viewer && self.liked == action.liked() {
            // Already reflected by our own flag; remember it and stop.
            self.known.insert(actor.clone(), action.liked());
            return false;
        }
        self.count = (self.count + action.delta()).max(0);
        self.known.insert(actor.clone(), action.liked());
        if is_viewer {
            self.liked = action.liked();
        }
        true
    }

    /// Take the server's answer to the local user's own mutation.
    pub fn confirm_own(&mut self, viewer: &UserId, status: LikeStatus, at: DateTime<Utc>) {
        self.replace(status, at);
        self.known.insert(viewer.clone(), status.liked);
    }

    /// Apply the local user's own optimistic action.
    pub fn apply_own(&mut self, viewer: &UserId, action: LikeAction) {
        self.liked = action.liked();
        self.count = (self.count + action.delta()).max(0);
        self.known.insert(viewer.clone(), action.liked());
    }

    pub fn status(&self) -> LikeStatus {
        LikeStatus {
            liked: self.liked,
            count: self.count,
        }
    }
}

/// The loaded part of one post's comment thread.
///
/// Items are kept ordered by creation time, ties broken by id, and never hold
/// two comments with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThread {
    pub post_id: PostId,
    pub items: Vec<Comment>,
    pub total_count: i64,
    pub has_more: bool,
    /// Pages fetched so far; the poll refetches this many.
    pub pages_loaded: u32,
    pub baseline_at: Option<DateTime<Utc>>,
}

impl CommentThread {
    pub fn new(post_id: PostId) -> Self {
        Self {
            post_id,
            items: Vec::new(),
            total_count: 0,
            has_more: false,
            pages_loaded: 0,
            baseline_at: None,
        }
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.items.iter().any(|c| &c.id == id)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.items.iter().find(|c| &c.id == id)
    }

    /// Insert unless the id is already present. Returns whether it was added.
    pub fn insert(&mut self, comment: Comment) -> bool {
        if self.contains(&comment.id) {
            return false;
        }
        let at = self
            .items
            .partition_point(|c| (c.created_at, &c.id) <= (comment.created_at, &comment.id));
        self.items.insert(at, comment);
        true
    }

    /// Remove `id` and every reply beneath it. Returns what was removed.
    pub fn remove(&mut self, id: &CommentId) -> Vec<Comment> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut doomed: HashSet<CommentId> = HashSet::from([id.clone()]);
        loop {
            let before = doomed.len();
            for c in &self.items {
                if c.parent_id.as_ref().is_some_and(|p| doomed.contains(p)) {
                    doomed.insert(c.id.clone());
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        let (removed, kept): (Vec<Comment>, Vec<Comment>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|c| doomed.contains(&c.id));
        self.items = kept;
        removed
    }

    /// Swap an optimistic comment for the stored one.
    ///
    /// If the stored comment already arrived by another path the placeholder
    /// is dropped and the count corrected.
    pub fn confirm(&mut self, temp_id: &CommentId, comment: Comment) {
        let had_temp = !self.remove(temp_id).is_empty();
        if !self.insert(comment) && had_temp {
            self.total_count = (self.total_count - 1).max(0);
        }
    }

    /// Placeholders of comments still being stored.
    pub fn pending(&self) -> Vec<Comment> {
        self.items
            .iter()
            .filter(|c| c.id.is_temporary())
            .cloned()
            .collect()
    }
}

/// Stories of one owner as last loaded, ordered by creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRing {
    pub owner: UserId,
    pub stories: Vec<Story>,
    pub baseline_at: Option<DateTime<Utc>>,
}

impl StoryRing {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            stories: Vec::new(),
            baseline_at: None,
        }
    }

    pub fn contains(&self, id: &StoryId) -> bool {
        self.stories.iter().any(|s| &s.id == id)
    }

    pub fn insert(&mut self, story: Story) -> bool {
        if self.contains(&story.id) {
            return false;
        }
        let at = self
            .stories
            .partition_point(|s| (s.created_at, &s.id) <= (story.created_at, &story.id));
        self.stories.insert(at, story);
        true
    }

    pub fn remove(&mut self, id: &StoryId) -> Option<Story> {
        let pos = self.stories.iter().position(|s| &s.id == id)?;
        Some(self.stories.remove(pos))
    }

    pub fn ids(&self) -> Vec<StoryId> {
        self.stories.iter().map(|s| s.id.clone()).collect()
    }
}

/// Profile facts learned from events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileState {
    pub image: Option<String>,
    pub verified: Option<bool>,
}

/// Everything a session has derived locally.
#[derive(Debug, Default)]
pub struct LocalState {
    pub likes: HashMap<EntityRef, LikeState>,
    pub threads: HashMap<PostId, CommentThread>,
    pub rings: HashMap<UserId, StoryRing>,
    pub profiles: HashMap<UserId, ProfileState>,
    pub flags: BTreeMap<String, bool>,
}

impl LocalState {
    /// The post a loaded comment belongs to.
    pub fn post_of_comment(&self, id: &CommentId) -> Option<&PostId> {
        self.threads
            .values()
            .find(|t| t.contains(id))
            .map(|t| &t.post_id)
    }

    /// The owner of a loaded story.
    pub fn owner_of_story(&self, id: &StoryId) -> Option<&UserId> {
        self.rings
            .values()
            .find(|r| r.contains(id))
            .map(|r| &r.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn comment(id: &str, parent: Option<&str>, at: DateTime<Utc>) -> Comment {
        Comment {
            id: CommentId::new(id),
            post_id: PostId::new("p"),
            parent_id: parent.map(CommentId::new),
            author_id: UserId::new("a"),
            body: format!("body {id}"),
            created_at: at,
        }
    }

    #[test]
    fn delta_is_skipped_when_included_in_baseline() {
        let t = Utc::now();
        let mut like = LikeState::from_status(LikeStatus { liked: false, count: 3 }, t);
        let bob = UserId::new("bob");
        assert!(!like.apply_delta(&bob, LikeAction::Like, t, false));
        assert!(!like.apply_delta(&bob, LikeAction::Like, t - Duration::seconds(1), false));
        assert_eq!(like.count, 3);
        assert!(like.apply_delta(&bob, LikeAction::Like, t + Duration::seconds(1), false));
        assert_eq!(like.count, 4);
        assert!(!like.liked);
    }

    #[test]
    fn repeated_delta_counts_once() {
        let t = Utc::now();
        let mut like = LikeState::from_status(LikeStatus { liked: false, count: 0 }, t);
        let bob = UserId::new("bob");
        let later = t + Duration::seconds(5);
        assert!(like.apply_delta(&bob, LikeAction::Like, later, false));
        assert!(!like.apply_delta(&bob, LikeAction::Like, later, false));
        assert_eq!(like.count, 1);
        assert!(like.apply_delta(&bob, LikeAction::Unlike, later, false));
        assert_eq!(like.count, 0);
    }

    #[test]
    fn count_never_goes_negative() {
        let mut like = LikeState::empty();
        like.apply_delta(&UserId::new("x"), LikeAction::Unlike, Utc::now(), false);
        assert_eq!(like.count, 0);
    }

    #[test]
    fn viewer_delta_from_other_session_moves_flag() {
        let t = Utc::now();
        let me = UserId::new("me");
        let mut like = LikeState::from_status(LikeStatus { liked: false, count: 2 }, t);
        assert!(like.apply_delta(&me, LikeAction::Like, t + Duration::seconds(1), true));
        assert!(like.liked);
        assert_eq!(like.count, 3);
    }

    #[test]
    fn thread_dedupes_and_orders() {
        let t = Utc::now();
        let mut thread = CommentThread::new(PostId::new("p"));
        assert!(thread.insert(comment("b", None, t + Duration::seconds(2))));
        assert!(thread.insert(comment("a", None, t)));
        assert!(!thread.insert(comment("a", None, t)));
        let ids: Vec<_> = thread.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn removing_a_comment_takes_its_replies() {
        let t = Utc::now();
        let mut thread = CommentThread::new(PostId::new("p"));
        thread.insert(comment("root", None, t));
        thread.insert(comment("reply", Some("root"), t + Duration::seconds(1)));
        thread.insert(comment("nested", Some("reply"), t + Duration::seconds(2)));
        thread.insert(comment("other", None, t + Duration::seconds(3)));
        let removed = thread.remove(&CommentId::new("root"));
        assert_eq!(removed.len(), 3);
        assert_eq!(thread.items.len(), 1);
        assert!(thread.remove(&CommentId::new("ghost")).is_empty());
    }

    #[test]
    fn confirm_replaces_placeholder_once() {
        let t = Utc::now();
        let mut thread = CommentThread::new(PostId::new("p"));
        let temp = CommentId::temporary("1");
        thread.insert(comment(temp.as_str(), None, t));
        thread.total_count = 1;
        thread.confirm(&temp, comment("real", None, t));
        assert_eq!(thread.items.len(), 1);
        assert_eq!(thread.items[0].id.as_str(), "real");
        assert_eq!(thread.total_count, 1);

        // Real comment already present (arrived by poll): placeholder dropped.
        let temp2 = CommentId::temporary("2");
        thread.insert(comment(temp2.as_str(), None, t));
        thread.total_count = 3;
        thread.confirm(&temp2, comment("real", None, t));
        assert_eq!(thread.items.len(), 1);
        assert_eq!(thread.total_count, 2);
    }
}
