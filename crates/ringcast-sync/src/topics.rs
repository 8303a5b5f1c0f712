// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed in-process publish/subscribe between the sync core and the UI.
//!
//! Topics are a closed enum. Handlers run synchronously on the publishing
//! task, outside the bus lock, so a handler may subscribe or unsubscribe.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use ringcast_core::{Comment, CommentId, EntityRef, PostId, StoryId, UserId};

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Like state and deletion of one post, comment or story.
    Entity(EntityRef),
    /// The comment thread of one post.
    Comments(PostId),
    /// One owner's story ring.
    StoryRing(UserId),
    /// Profile image and verification badge of one user.
    Profile(UserId),
    FeatureFlags,
    /// User-visible notices (failed mutations).
    Notice,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Entity(e) => write!(f, "entity:{e}"),
            Topic::Comments(p) => write!(f, "comments:{p}"),
            Topic::StoryRing(u) => write!(f, "story-ring:{u}"),
            Topic::Profile(u) => write!(f, "profile:{u}"),
            Topic::FeatureFlags => f.write_str("feature-flags"),
            Topic::Notice => f.write_str("notice"),
        }
    }
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub entity: Option<EntityRef>,
}

/// A change to local state, delivered to subscribers of a [`Topic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Like {
        entity: EntityRef,
        liked: bool,
        count: i64,
    },
    CommentAdded {
        post_id: PostId,
        comment: Comment,
    },
    /// An optimistic comment received its server id.
    CommentConfirmed {
        post_id: PostId,
        temp_id: CommentId,
        comment: Comment,
    },
    CommentRemoved {
        post_id: PostId,
        comment_id: CommentId,
    },
    CommentsRefreshed {
        post_id: PostId,
        total_count: i64,
    },
    StoryRing {
        owner: UserId,
        active_count: usize,
        has_unviewed: bool,
    },
    StoryRemoved {
        owner: UserId,
        story_id: StoryId,
    },
    StoryViewed {
        owner: UserId,
        story_id: StoryId,
        viewer: UserId,
    },
    Profile {
        user_id: UserId,
        image: Option<String>,
    },
    Verification {
        user_id: UserId,
        verified: bool,
    },
    FeatureFlag {
        name: String,
        enabled: bool,
    },
    Notice(Notice),
}

impl Notification {
    /// Whether this tells an entity subscriber its entity is gone.
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Notification::CommentRemoved { .. } | Notification::StoryRemoved { .. }
        )
    }
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

impl Registry {
    fn remove(&mut self, topic: &Topic, id: u64) -> bool {
        let Some(list) = self.handlers.get_mut(topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(topic);
        }
        removed
    }
}

/// The local bus. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBus")
            .field("topics", &self.registry().handlers.len())
            .finish()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `topic`. Dropping the returned handle unsubscribes.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            topic,
            id,
        }
    }

    /// Deliver `message` to every current subscriber of `topic`.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, topic: &Topic, message: &Notification) -> usize {
        let handlers: Vec<Handler> = match self.registry().handlers.get(topic) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(message);
        }
        tracing::trace!(topic = %topic, handlers = handlers.len(), "local publish");
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.registry().handlers.get(topic).map_or(0, Vec::len)
    }
}

/// Handle for one registered handler.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.topic, self.id);
        }
    }
}
