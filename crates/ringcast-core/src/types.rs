// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the event channel and the client-side sync core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for an authenticated user.
    UserId
);
string_id!(
    /// Unique identifier for a post.
    PostId
);
string_id!(
    /// Unique identifier for a story.
    StoryId
);
string_id!(
    /// Unique identifier for a comment. Optimistic comments carry a
    /// temporary id (see [`CommentId::temporary`]) until the server assigns one.
    CommentId
);
string_id!(
    /// Unique identifier for a live event-channel connection.
    ConnectionId
);

const TEMP_PREFIX: &str = "temp-";

impl CommentId {
    /// Build a client-local placeholder id for a comment not yet stored.
    pub fn temporary(token: impl fmt::Display) -> Self {
        Self(format!("{TEMP_PREFIX}{token}"))
    }

    /// Whether this id is a client-local placeholder.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }
}

impl StoryId {
    /// Placeholder id of a story still being uploaded.
    pub fn temporary(token: impl fmt::Display) -> Self {
        Self(format!("{TEMP_PREFIX}{token}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }
}

/// Kinds of entity that carry like state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Post,
    Comment,
    Story,
}

/// A reference to a likeable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn post(id: &PostId) -> Self {
        Self {
            kind: EntityKind::Post,
            id: id.0.clone(),
        }
    }

    pub fn comment(id: &CommentId) -> Self {
        Self {
            kind: EntityKind::Comment,
            id: id.0.clone(),
        }
    }

    pub fn story(id: &StoryId) -> Self {
        Self {
            kind: EntityKind::Story,
            id: id.0.clone(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A time-stamped story owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub owner_id: UserId,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
}

/// A comment on a post, optionally a reply to another comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Authoritative like state for one entity as seen by one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeStatus {
    pub liked: bool,
    pub count: i64,
}

/// One page of a post's comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub items: Vec<Comment>,
    pub has_more: bool,
    pub total_count: i64,
}

/// Status of the follow edge from a viewer to an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FollowStatus {
    Accepted,
    Pending,
}

/// Server truth about which of an owner's stories a viewer has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStatus {
    pub viewed_story_ids: Vec<StoryId>,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn temporary_comment_ids_are_marked() {
        let temp = CommentId::temporary("abc");
        assert!(temp.is_temporary());
        assert_eq!(temp.as_str(), "temp-abc");
        assert!(!CommentId::new("42").is_temporary());
        assert!(StoryId::temporary("x").is_temporary());
    }

    #[test]
    fn entity_kind_parses_lowercase() {
        assert_eq!(EntityKind::from_str("story").unwrap(), EntityKind::Story);
        assert_eq!(EntityKind::Comment.to_string(), "comment");
        let json = serde_json::to_string(&EntityKind::Post).unwrap();
        assert_eq!(json, "\"post\"");
    }

    #[test]
    fn entity_ref_display() {
        let e = EntityRef::post(&PostId::new("p1"));
        assert_eq!(e.to_string(), "post:p1");
    }

    #[test]
    fn follow_status_wire_format() {
        let json = serde_json::to_string(&FollowStatus::Accepted).unwrap();
        assert_eq!(json, "\"ACCEPTED\"");
        assert_eq!(FollowStatus::from_str("PENDING").unwrap(), FollowStatus::Pending);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId::new("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }
}
