// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits for the external collaborators Ringcast consults.
//!
//! The relational store is reached through [`DataStore`]; the client's
//! durable local storage through [`DurableStorage`].

pub mod data_store;
pub mod storage;

pub use data_store::DataStore;
pub use storage::DurableStorage;
