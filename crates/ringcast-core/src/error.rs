// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Ringcast.

use thiserror::Error;

/// The primary error type used across all Ringcast crates.
#[derive(Debug, Error)]
pub enum RingcastError {
    /// Configuration errors (invalid TOML, missing secrets, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable storage errors (database open, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Event channel errors (disconnected socket, closed queue, bind failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The data store could not be reached or failed to answer.
    #[error("data store error: {message}")]
    DataStore {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server declined a mutation (like, comment, view, upload).
    #[error("mutation rejected: {message}")]
    Rejected { message: String },

    /// A mutation of the same kind is already in flight for this entity.
    #[error("{kind} already in flight for {entity}")]
    MutationInFlight { entity: String, kind: String },

    /// A local precondition of an action did not hold.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Authentication or authorization failure.
    #[error("auth error: {0}")]
    Auth(String),

    /// A malformed frame, room name or event payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RingcastError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a data store error without an underlying source.
    pub fn data_store(message: impl Into<String>) -> Self {
        Self::DataStore {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error means the server refused or failed a mutation, in
    /// which case the optimistic state must be rolled back.
    pub fn is_mutation_failure(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::DataStore { .. } | Self::Timeout { .. }
        )
    }
}
