// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for multi-session scenarios.
//!
//! `TestHarness` runs one in-process [`RoomHub`] and one [`MockDataStore`]
//! and hands out [`SyncClient`]s connected to them through
//! [`LocalTransport`]s, so a test can play several users and tabs at once.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use ringcast_bus::RoomHub;
use ringcast_core::{DurableStorage, UserId};
use ringcast_storage::MemoryStorage;
use ringcast_sync::{LocalTransport, SyncClient, SyncOptions, ViewStateStore};

use crate::mock_store::MockDataStore;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    options: SyncOptions,
    queue_capacity: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            options: SyncOptions {
                reconnect_backoff: Duration::from_millis(50),
                reconnect_max_backoff: Duration::from_millis(500),
                ..SyncOptions::default()
            },
            queue_capacity: 64,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn with_story_ttl_hours(mut self, hours: u32) -> Self {
        self.options.story_ttl_hours = hours;
        self
    }

    pub fn with_reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.options.reconnect_backoff = base;
        self.options.reconnect_max_backoff = max;
        self
    }

    /// Outbound frames buffered per hub connection.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> TestHarness {
        TestHarness {
            hub: Arc::new(RoomHub::new(self.queue_capacity)),
            store: Arc::new(MockDataStore::new()),
            options: self.options,
        }
    }
}

/// A hub, a data store, and a factory for client sessions.
pub struct TestHarness {
    pub hub: Arc<RoomHub>,
    pub store: Arc<MockDataStore>,
    options: SyncOptions,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// A session of `user` with its own durable storage (a fresh device).
    pub fn client(&self, user: &str) -> TestClient {
        self.client_with_storage(user, Arc::new(MemoryStorage::new()))
    }

    /// A session of `user` on `storage`, e.g. a second tab of one profile.
    pub fn client_with_storage(&self, user: &str, storage: Arc<MemoryStorage>) -> TestClient {
        let user = UserId::new(user);
        let transport = Arc::new(LocalTransport::new(
            Arc::clone(&self.hub),
            Some(user.clone()),
        ));
        let durable: Arc<dyn DurableStorage> = storage.clone();
        let client = SyncClient::new(
            user,
            self.store.clone(),
            transport.clone(),
            ViewStateStore::new(durable),
            self.options.clone(),
        );
        TestClient {
            client,
            transport,
            storage,
        }
    }
}

/// A client session plus handles on its transport and storage.
pub struct TestClient {
    pub client: SyncClient,
    pub transport: Arc<LocalTransport>,
    pub storage: Arc<MemoryStorage>,
}

impl TestClient {
    /// Start the session and wait until its channel is up.
    pub async fn start_connected(&self) -> bool {
        self.client.start();
        let client = self.client.clone();
        eventually(move || client.is_connected()).await
    }
}

impl Deref for TestClient {
    type Target = SyncClient;

    fn deref(&self) -> &SyncClient {
        &self.client
    }
}

/// Poll `check` until it holds, giving background tasks time to run.
///
/// Returns false after five seconds of (possibly paused) tokio time.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
