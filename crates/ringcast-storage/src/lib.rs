// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable storage backends for the client view-state store.
//!
//! [`SqliteStorage`] persists to a single SQLite file with embedded
//! migrations; [`MemoryStorage`] lives only as long as the process and backs
//! tests and ephemeral sessions.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
