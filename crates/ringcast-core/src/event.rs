// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed catalogue of fan-out events.
//!
//! On the wire a [`FanoutEvent`] is a JSON object:
//!
//! ```json
//! {"type": "likeUpdate",
//!  "payload": {"entityKind": "post", "entityId": "p1", "actorId": "u1", "action": "like"},
//!  "timestamp": "2026-01-01T00:00:00Z",
//!  "origin": "conn-7"}
//! ```
//!
//! `origin` is the connection that emitted the event and is stamped by the
//! server; clients never set it themselves.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};

use crate::error::RingcastError;
use crate::room::Room;
use crate::types::{
    Comment, CommentId, ConnectionId, EntityKind, EntityRef, PostId, Story, StoryId, UserId,
};

/// Discriminant of a [`FanoutEvent`], as written in its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventType {
    LikeUpdate,
    CommentCreate,
    CommentDelete,
    StoryView,
    StoryUploaded,
    StoryDeleted,
    ProfileUpdate,
    FeatureToggle,
    VerificationUpdate,
}

/// Direction of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    /// Counter delta this action applies.
    pub fn delta(self) -> i64 {
        match self {
            LikeAction::Like => 1,
            LikeAction::Unlike => -1,
        }
    }

    /// The `liked` flag after this action.
    pub fn liked(self) -> bool {
        matches!(self, LikeAction::Like)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeUpdate {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub actor_id: UserId,
    pub action: LikeAction,
    /// Post a liked comment belongs to; routes the event to `post:{id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    /// Owner of a liked story; routes the event to `user:{id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    /// When the like was committed, taken before the data-store write.
    /// Receivers compare this, not the emit time, with their last fetch.
    #[serde(
        rename = "timestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub committed_at: Option<DateTime<Utc>>,
}

impl LikeUpdate {
    pub fn entity(&self) -> EntityRef {
        EntityRef {
            kind: self.entity_kind,
            id: self.entity_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreate {
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDelete {
    pub post_id: PostId,
    pub comment_id: CommentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub actor_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub owner_id: UserId,
    pub story_id: StoryId,
    pub viewer_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryUploaded {
    pub owner_id: UserId,
    pub story: Story,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDeleted {
    pub owner_id: UserId,
    pub story_id: StoryId,
    pub remaining_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub user_id: UserId,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    pub flag_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationUpdate {
    pub user_id: UserId,
    pub verified: bool,
}

/// Typed payload of a fan-out event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    LikeUpdate(LikeUpdate),
    CommentCreate(CommentCreate),
    CommentDelete(CommentDelete),
    StoryView(StoryView),
    StoryUploaded(StoryUploaded),
    StoryDeleted(StoryDeleted),
    ProfileUpdate(ProfileUpdate),
    FeatureToggle(FeatureToggle),
    VerificationUpdate(VerificationUpdate),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::LikeUpdate(_) => EventType::LikeUpdate,
            EventPayload::CommentCreate(_) => EventType::CommentCreate,
            EventPayload::CommentDelete(_) => EventType::CommentDelete,
            EventPayload::StoryView(_) => EventType::StoryView,
            EventPayload::StoryUploaded(_) => EventType::StoryUploaded,
            EventPayload::StoryDeleted(_) => EventType::StoryDeleted,
            EventPayload::ProfileUpdate(_) => EventType::ProfileUpdate,
            EventPayload::FeatureToggle(_) => EventType::FeatureToggle,
            EventPayload::VerificationUpdate(_) => EventType::VerificationUpdate,
        }
    }

    /// The user whose action this event describes.
    ///
    /// `None` for events only the server may publish (feature toggles and
    /// verification changes).
    pub fn actor(&self) -> Option<&UserId> {
        match self {
            EventPayload::LikeUpdate(e) => Some(&e.actor_id),
            EventPayload::CommentCreate(e) => Some(&e.comment.author_id),
            EventPayload::CommentDelete(e) => Some(&e.actor_id),
            EventPayload::StoryView(e) => Some(&e.viewer_id),
            EventPayload::StoryUploaded(e) => Some(&e.owner_id),
            EventPayload::StoryDeleted(e) => Some(&e.owner_id),
            EventPayload::ProfileUpdate(e) => Some(&e.user_id),
            EventPayload::FeatureToggle(_) | EventPayload::VerificationUpdate(_) => None,
        }
    }

    /// Default rooms interested in this event.
    pub fn rooms(&self) -> Vec<Room> {
        match self {
            EventPayload::LikeUpdate(e) => match e.entity_kind {
                EntityKind::Post => vec![Room::Post(PostId::new(e.entity_id.clone()))],
                EntityKind::Comment => match &e.post_id {
                    Some(post) => vec![Room::Post(post.clone())],
                    None => vec![Room::Global],
                },
                EntityKind::Story => match &e.owner_id {
                    Some(owner) => vec![Room::User(owner.clone())],
                    None => vec![Room::Global],
                },
            },
            EventPayload::CommentCreate(e) => vec![Room::Post(e.post_id.clone())],
            EventPayload::CommentDelete(e) => vec![Room::Post(e.post_id.clone())],
            EventPayload::StoryView(e) => {
                let mut rooms = vec![Room::User(e.owner_id.clone())];
                if e.viewer_id != e.owner_id {
                    rooms.push(Room::User(e.viewer_id.clone()));
                }
                rooms
            }
            EventPayload::StoryUploaded(_)
            | EventPayload::StoryDeleted(_)
            | EventPayload::ProfileUpdate(_)
            | EventPayload::FeatureToggle(_) => vec![Room::Global],
            EventPayload::VerificationUpdate(e) => vec![Room::User(e.user_id.clone())],
        }
    }
}

/// A typed, payload-bearing message broadcast to a room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct FanoutEvent {
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub origin: Option<ConnectionId>,
}

impl FanoutEvent {
    /// Create an event stamped with the current time and no origin.
    pub fn new(payload: EventPayload) -> Self {
        Self::at(payload, Utc::now())
    }

    pub fn at(payload: EventPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload,
            timestamp,
            origin: None,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn actor(&self) -> Option<&UserId> {
        self.payload.actor()
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.payload.rooms()
    }
}

impl Serialize for FanoutEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.origin.is_some() { 4 } else { 3 };
        let mut s = serializer.serialize_struct("FanoutEvent", fields)?;
        s.serialize_field("type", &self.event_type())?;
        match &self.payload {
            EventPayload::LikeUpdate(p) => s.serialize_field("payload", p)?,
            EventPayload::CommentCreate(p) => s.serialize_field("payload", p)?,
            EventPayload::CommentDelete(p) => s.serialize_field("payload", p)?,
            EventPayload::StoryView(p) => s.serialize_field("payload", p)?,
            EventPayload::StoryUploaded(p) => s.serialize_field("payload", p)?,
            EventPayload::StoryDeleted(p) => s.serialize_field("payload", p)?,
            EventPayload::ProfileUpdate(p) => s.serialize_field("payload", p)?,
            EventPayload::FeatureToggle(p) => s.serialize_field("payload", p)?,
            EventPayload::VerificationUpdate(p) => s.serialize_field("payload", p)?,
        }
        s.serialize_field("timestamp", &self.timestamp)?;
        if let Some(origin) = &self.origin {
            s.serialize_field("origin", origin)?;
        }
        s.end()
    }
}

/// Untyped wire shape, decoded into a [`FanoutEvent`] once `type` is known.
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: EventType,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    origin: Option<ConnectionId>,
}

impl TryFrom<RawEvent> for FanoutEvent {
    type Error = RingcastError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        fn decode<T: serde::de::DeserializeOwned>(
            kind: EventType,
            value: serde_json::Value,
        ) -> Result<T, RingcastError> {
            serde_json::from_value(value)
                .map_err(|e| RingcastError::Protocol(format!("invalid {kind} payload: {e}")))
        }

        let payload = match raw.kind {
            EventType::LikeUpdate => EventPayload::LikeUpdate(decode(raw.kind, raw.payload)?),
            EventType::CommentCreate => {
                EventPayload::CommentCreate(decode(raw.kind, raw.payload)?)
            }
            EventType::CommentDelete => {
                EventPayload::CommentDelete(decode(raw.kind, raw.payload)?)
            }
            EventType::StoryView => EventPayload::StoryView(decode(raw.kind, raw.payload)?),
            EventType::StoryUploaded => {
                EventPayload::StoryUploaded(decode(raw.kind, raw.payload)?)
            }
            EventType::StoryDeleted => EventPayload::StoryDeleted(decode(raw.kind, raw.payload)?),
            EventType::ProfileUpdate => {
                EventPayload::ProfileUpdate(decode(raw.kind, raw.payload)?)
            }
            EventType::FeatureToggle => {
                EventPayload::FeatureToggle(decode(raw.kind, raw.payload)?)
            }
            EventType::VerificationUpdate => {
                EventPayload::VerificationUpdate(decode(raw.kind, raw.payload)?)
            }
        };

        Ok(FanoutEvent {
            payload,
            timestamp: raw.timestamp,
            origin: raw.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn like(kind: EntityKind, id: &str) -> LikeUpdate {
        LikeUpdate {
            entity_kind: kind,
            entity_id: id.into(),
            actor_id: UserId::new("a"),
            action: LikeAction::Like,
            post_id: None,
            owner_id: None,
            committed_at: None,
        }
    }

    #[test]
    fn like_update_wire_shape() {
        let event = FanoutEvent::at(EventPayload::LikeUpdate(like(EntityKind::Post, "P")), ts());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "likeUpdate");
        assert_eq!(json["payload"]["entityId"], "P");
        assert_eq!(json["payload"]["actorId"], "a");
        assert_eq!(json["payload"]["action"], "like");
        assert!(json.get("origin").is_none());
        let back: FanoutEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn like_commit_time_travels_as_payload_timestamp() {
        let mut update = like(EntityKind::Post, "P");
        update.committed_at = Some(ts());
        let event = FanoutEvent::at(
            EventPayload::LikeUpdate(update),
            ts() + chrono::Duration::seconds(1),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["timestamp"], "2026-01-01T00:00:00Z");
        assert_eq!(json["timestamp"], "2026-01-01T00:00:01Z");
        let back: FanoutEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn origin_is_carried_when_stamped() {
        let mut event = FanoutEvent::at(
            EventPayload::FeatureToggle(FeatureToggle {
                flag_name: "reels".into(),
                enabled: false,
            }),
            ts(),
        );
        event.origin = Some(ConnectionId::new("c1"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"origin\":\"c1\""));
        let back: FanoutEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.origin, Some(ConnectionId::new("c1")));
    }

    #[test]
    fn payload_not_matching_type_is_rejected() {
        let json = serde_json::json!({
            "type": "storyView",
            "payload": {"flagName": "x", "enabled": true},
            "timestamp": "2026-01-01T00:00:00Z"
        });
        let err = serde_json::from_value::<FanoutEvent>(json).unwrap_err();
        assert!(err.to_string().contains("storyView"), "{err}");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = serde_json::json!({
            "type": "somethingElse",
            "payload": {},
            "timestamp": "2026-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<FanoutEvent>(json).is_err());
    }

    #[test]
    fn like_routing_follows_entity_kind() {
        let post = EventPayload::LikeUpdate(like(EntityKind::Post, "P"));
        assert_eq!(post.rooms(), vec![Room::Post(PostId::new("P"))]);

        let mut c = like(EntityKind::Comment, "C");
        c.post_id = Some(PostId::new("P"));
        assert_eq!(
            EventPayload::LikeUpdate(c).rooms(),
            vec![Room::Post(PostId::new("P"))]
        );

        let mut s = like(EntityKind::Story, "S");
        s.owner_id = Some(UserId::new("o"));
        assert_eq!(
            EventPayload::LikeUpdate(s).rooms(),
            vec![Room::User(UserId::new("o"))]
        );
    }

    #[test]
    fn story_view_reaches_owner_and_viewer() {
        let view = EventPayload::StoryView(StoryView {
            owner_id: UserId::new("o"),
            story_id: StoryId::new("s"),
            viewer_id: UserId::new("v"),
        });
        assert_eq!(
            view.rooms(),
            vec![Room::User(UserId::new("o")), Room::User(UserId::new("v"))]
        );
        assert_eq!(view.actor(), Some(&UserId::new("v")));
    }

    #[test]
    fn server_only_events_have_no_actor() {
        let flag = EventPayload::FeatureToggle(FeatureToggle {
            flag_name: "f".into(),
            enabled: true,
        });
        assert!(flag.actor().is_none());
        let verified = EventPayload::VerificationUpdate(VerificationUpdate {
            user_id: UserId::new("u"),
            verified: true,
        });
        assert!(verified.actor().is_none());
        assert_eq!(verified.rooms(), vec![Room::User(UserId::new("u"))]);
    }

    #[test]
    fn like_action_delta() {
        assert_eq!(LikeAction::Like.delta(), 1);
        assert_eq!(LikeAction::Unlike.delta(), -1);
        assert!(LikeAction::Like.liked());
        assert!(!LikeAction::Unlike.liked());
    }
}
