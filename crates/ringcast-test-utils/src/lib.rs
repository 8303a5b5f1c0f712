// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Ringcast integration tests.
//!
//! # Components
//!
//! - [`MockDataStore`] - in-memory data store with failure injection
//! - [`TestHarness`] - a room hub plus any number of client sessions

pub mod harness;
pub mod mock_store;

pub use harness::{TestClient, TestHarness, eventually};
pub use mock_store::MockDataStore;
