// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Story expiry and "unviewed" derivation.
//!
//! Everything here is a pure function of its arguments. Callers pass the
//! current time explicitly and re-evaluate on every poll or render.

use chrono::{DateTime, Duration, Utc};

use ringcast_core::{Story, UserId};

use crate::view_state::ViewStateEntry;

/// Default lifetime of a story.
pub const DEFAULT_STORY_TTL_HOURS: u32 = 24;

fn ttl(ttl_hours: u32) -> Duration {
    Duration::hours(i64::from(ttl_hours))
}

/// Whether something created at `created_at` is younger than `ttl_hours`.
pub fn is_active(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl_hours: u32) -> bool {
    now.signed_duration_since(created_at) < ttl(ttl_hours)
}

/// The oldest creation time still active at `now`; the `since` argument for
/// [`DataStore::list_active_stories`](ringcast_core::DataStore::list_active_stories).
pub fn active_since(now: DateTime<Utc>, ttl_hours: u32) -> DateTime<Utc> {
    now - ttl(ttl_hours)
}

/// The subset of `stories` still active at `now`, in input order.
pub fn active_stories(stories: &[Story], now: DateTime<Utc>, ttl_hours: u32) -> Vec<Story> {
    stories
        .iter()
        .filter(|s| is_active(s.created_at, now, ttl_hours))
        .cloned()
        .collect()
}

/// Whether `viewer` has anything left to see among `owner`'s `stories`.
///
/// The owner looking at their own tray uses the `last_viewed_at` cursor, so
/// opening the tray resets the ring at once. Anyone else uses the per-id set,
/// so a story posted after they last looked stays unviewed.
///
/// An owner with no stories has nothing unviewed.
pub fn has_unviewed(
    owner: &UserId,
    viewer: &UserId,
    stories: &[Story],
    entry: &ViewStateEntry,
) -> bool {
    if stories.is_empty() {
        return false;
    }
    if owner == viewer {
        match entry.last_viewed_at {
            None => true,
            Some(cursor) => stories.iter().any(|s| s.created_at > cursor),
        }
    } else {
        stories.iter().any(|s| !entry.viewed_item_ids.contains(&s.id))
    }
}
