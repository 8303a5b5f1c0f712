// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable key/value storage local to one client profile.

use crate::error::RingcastError;

/// Process-local durable storage, the equivalent of a browser's local storage.
///
/// Writes are last-write-wins; two sessions sharing one profile may overwrite
/// each other. Calls are synchronous so a mutation is persisted before the
/// caller continues.
pub trait DurableStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, RingcastError>;

    fn put(&self, key: &str, value: &str) -> Result<(), RingcastError>;

    fn remove(&self, key: &str) -> Result<(), RingcastError>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, RingcastError>;
}
