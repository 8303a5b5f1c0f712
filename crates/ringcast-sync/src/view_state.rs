// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(owner, viewer) story view cursors backed by durable local storage.
//!
//! Entries are stored as JSON under `viewed_{owner}_{viewer}`. Reads never
//! fail: a missing, unreadable or corrupt entry is an empty one, which makes
//! the ring show as unviewed until the server says otherwise.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ringcast_core::{DurableStorage, RingcastError, StoryId, UserId, ViewStatus};

const KEY_PREFIX: &str = "viewed_";

/// What one viewer has seen of one owner's stories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStateEntry {
    /// Cursor used when the viewer is the owner.
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
    /// Stories seen, used when the viewer is someone else.
    #[serde(default)]
    pub viewed_item_ids: BTreeSet<StoryId>,
}

impl ViewStateEntry {
    /// Fold `ids` seen at `at` into this entry. Never moves the cursor back.
    pub fn merge_viewed<'a>(&mut self, ids: impl IntoIterator<Item = &'a StoryId>, at: DateTime<Utc>) {
        self.viewed_item_ids.extend(ids.into_iter().cloned());
        self.advance_cursor(Some(at));
    }

    fn advance_cursor(&mut self, at: Option<DateTime<Utc>>) {
        self.last_viewed_at = match (self.last_viewed_at, at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Storage key of the entry for (`owner`, `viewer`).
pub fn storage_key(owner: &UserId, viewer: &UserId) -> String {
    format!("{KEY_PREFIX}{owner}_{viewer}")
}

/// Whether `entry` only describes stories that have all expired by `now`.
///
/// An entry that was never written to is stale.
pub fn is_stale(entry: &ViewStateEntry, ttl_hours: u32, now: DateTime<Utc>) -> bool {
    match entry.last_viewed_at {
        Some(at) => now.signed_duration_since(at) >= Duration::hours(i64::from(ttl_hours)),
        None => entry.viewed_item_ids.is_empty(),
    }
}

/// Read-through view-state store.
///
/// There is no in-memory cache: two sessions sharing one storage see each
/// other's writes, last write wins.
#[derive(Clone)]
pub struct ViewStateStore {
    storage: Arc<dyn DurableStorage>,
}

impl ViewStateStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Current entry for (`owner`, `viewer`); empty when absent or unreadable.
    pub fn get(&self, owner: &UserId, viewer: &UserId) -> ViewStateEntry {
        let key = storage_key(owner, viewer);
        let raw = match self.storage.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ViewStateEntry::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "view-state read failed, treating as empty");
                return ViewStateEntry::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "corrupt view-state entry, treating as empty");
            ViewStateEntry::default()
        })
    }

    /// Overwrite the entry for (`owner`, `viewer`).
    pub fn put(
        &self,
        owner: &UserId,
        viewer: &UserId,
        entry: &ViewStateEntry,
    ) -> Result<(), RingcastError> {
        let json = serde_json::to_string(entry).map_err(|e| RingcastError::Storage {
            source: Box::new(e),
        })?;
        self.storage.put(&storage_key(owner, viewer), &json)
    }

    /// Record that `viewer` saw `item_ids` of `owner` at `at`, and persist.
    pub fn mark_viewed(
        &self,
        owner: &UserId,
        viewer: &UserId,
        item_ids: &[StoryId],
        at: DateTime<Utc>,
    ) -> Result<ViewStateEntry, RingcastError> {
        let mut entry = self.get(owner, viewer);
        entry.merge_viewed(item_ids, at);
        self.put(owner, viewer, &entry)?;
        debug!(owner = %owner, viewer = %viewer, items = item_ids.len(), "stories marked viewed");
        Ok(entry)
    }

    /// Merge server truth fetched on mount.
    ///
    /// Views are never revoked, so this is a union: ids the server knows are
    /// added and the cursor only moves forward. A view recorded locally but
    /// not yet on the server survives.
    pub fn reconcile(
        &self,
        owner: &UserId,
        viewer: &UserId,
        status: &ViewStatus,
    ) -> Result<ViewStateEntry, RingcastError> {
        let mut entry = self.get(owner, viewer);
        let before = entry.clone();
        entry
            .viewed_item_ids
            .extend(status.viewed_story_ids.iter().cloned());
        entry.advance_cursor(status.last_viewed_at);
        if entry != before {
            self.put(owner, viewer, &entry)?;
        }
        Ok(entry)
    }

    /// Drop ids that are no longer among `active` so entries stay bounded.
    pub fn retain_active(
        &self,
        owner: &UserId,
        viewer: &UserId,
        active: &[StoryId],
    ) -> Result<(), RingcastError> {
        let mut entry = self.get(owner, viewer);
        let before = entry.viewed_item_ids.len();
        entry.viewed_item_ids.retain(|id| active.contains(id));
        if entry.viewed_item_ids.len() != before {
            self.put(owner, viewer, &entry)?;
        }
        Ok(())
    }

    /// Remove every stale entry. Returns how many were removed.
    pub fn sweep_stale(&self, ttl_hours: u32, now: DateTime<Utc>) -> Result<usize, RingcastError> {
        let mut removed = 0;
        for key in self.storage.keys_with_prefix(KEY_PREFIX)? {
            let stale = match self.storage.get(&key)? {
                Some(raw) => serde_json::from_str::<ViewStateEntry>(&raw)
                    .map(|entry| is_stale(&entry, ttl_hours, now))
                    .unwrap_or(true),
                None => false,
            };
            if stale {
                self.storage.remove(&key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "stale view-state entries swept");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringcast_storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, ViewStateStore) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), ViewStateStore::new(storage))
    }

    fn ids(list: &[&str]) -> Vec<StoryId> {
        list.iter().map(|s| StoryId::new(*s)).collect()
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(
            storage_key(&UserId::new("o1"), &UserId::new("v2")),
            "viewed_o1_v2"
        );
    }

    #[test]
    fn missing_entry_is_empty() {
        let (_, store) = store();
        assert_eq!(
            store.get(&UserId::new("o"), &UserId::new("v")),
            ViewStateEntry::default()
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn corrupt_entry_fails_open() {
        let (storage, store) = store();
        storage.put("viewed_o_v", "{not json").unwrap();
        assert_eq!(
            store.get(&UserId::new("o"), &UserId::new("v")),
            ViewStateEntry::default()
        );
        assert!(logs_contain("corrupt view-state entry"));
    }

    #[test]
    fn mark_viewed_persists_immediately() {
        let (storage, store) = store();
        let (o, v) = (UserId::new("o"), UserId::new("v"));
        let t = Utc::now();
        store.mark_viewed(&o, &v, &ids(&["s1", "s2"]), t).unwrap();

        let raw = storage.get("viewed_o_v").unwrap().unwrap();
        let persisted: ViewStateEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.viewed_item_ids.len(), 2);
        assert_eq!(persisted.last_viewed_at, Some(t));

        // A second store over the same storage sees it (reload).
        let reloaded = ViewStateStore::new(storage);
        assert_eq!(reloaded.get(&o, &v), persisted);
    }

    #[test]
    fn mark_viewed_is_idempotent_and_cursor_monotonic() {
        let (_, store) = store();
        let (o, v) = (UserId::new("o"), UserId::new("v"));
        let t = Utc::now();
        let first = store.mark_viewed(&o, &v, &ids(&["s1"]), t).unwrap();
        let again = store.mark_viewed(&o, &v, &ids(&["s1"]), t).unwrap();
        assert_eq!(first, again);
        let older = store
            .mark_viewed(&o, &v, &ids(&["s0"]), t - Duration::hours(1))
            .unwrap();
        assert_eq!(older.last_viewed_at, Some(t));
        assert_eq!(older.viewed_item_ids.len(), 2);
    }

    #[test]
    fn reconcile_unions_server_truth() {
        let (_, store) = store();
        let (o, v) = (UserId::new("o"), UserId::new("v"));
        let t = Utc::now();
        store.mark_viewed(&o, &v, &ids(&["local"]), t).unwrap();
        let entry = store
            .reconcile(
                &o,
                &v,
                &ViewStatus {
                    viewed_story_ids: ids(&["remote"]),
                    last_viewed_at: Some(t - Duration::minutes(1)),
                },
            )
            .unwrap();
        assert_eq!(entry.viewed_item_ids, ids(&["local", "remote"]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(entry.last_viewed_at, Some(t));
    }

    #[test]
    fn retain_active_prunes_expired_ids() {
        let (_, store) = store();
        let (o, v) = (UserId::new("o"), UserId::new("v"));
        store
            .mark_viewed(&o, &v, &ids(&["gone", "kept"]), Utc::now())
            .unwrap();
        store.retain_active(&o, &v, &ids(&["kept", "new"])).unwrap();
        assert_eq!(
            store.get(&o, &v).viewed_item_ids,
            ids(&["kept"]).into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn staleness_follows_cursor_age() {
        let now = Utc::now();
        let mut entry = ViewStateEntry::default();
        assert!(is_stale(&entry, 24, now));
        entry.merge_viewed(&ids(&["s"]), now - Duration::hours(23));
        assert!(!is_stale(&entry, 24, now));
        entry.last_viewed_at = Some(now - Duration::hours(24));
        assert!(is_stale(&entry, 24, now));
    }

    #[test]
    fn sweep_removes_only_stale_and_corrupt_entries() {
        let (storage, store) = store();
        let now = Utc::now();
        store
            .mark_viewed(&UserId::new("a"), &UserId::new("v"), &ids(&["x"]), now - Duration::hours(30))
            .unwrap();
        store
            .mark_viewed(&UserId::new("b"), &UserId::new("v"), &ids(&["y"]), now)
            .unwrap();
        storage.put("viewed_c_v", "garbage").unwrap();
        storage.put("unrelated", "garbage").unwrap();

        assert_eq!(store.sweep_stale(24, now).unwrap(), 2);
        assert_eq!(storage.keys_with_prefix("viewed_").unwrap(), vec!["viewed_b_v"]);
        assert!(storage.get("unrelated").unwrap().is_some());
    }
}
