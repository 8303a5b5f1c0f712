// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process storage.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use ringcast_core::{DurableStorage, RingcastError};

/// A [`DurableStorage`] that forgets everything when dropped.
///
/// Cloning the `Arc` that holds it is how two sessions share one "profile".
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, RingcastError> {
        self.entries
            .lock()
            .map_err(|_| RingcastError::Internal("memory storage lock poisoned".into()))
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, RingcastError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), RingcastError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RingcastError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, RingcastError> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);
        storage.put("k", "v1").unwrap();
        storage.put("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));
        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let storage = MemoryStorage::new();
        for key in ["viewed_b_x", "viewed_a_x", "other", "viewed_c_y", "viewee"] {
            storage.put(key, "{}").unwrap();
        }
        assert_eq!(
            storage.keys_with_prefix("viewed_").unwrap(),
            vec!["viewed_a_x", "viewed_b_x", "viewed_c_y"]
        );
    }
}
