// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so that a misspelled key
//! is reported at startup instead of silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level Ringcast configuration. Every section defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RingcastConfig {
    /// Event channel server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Client-side reconciliation settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Durable view-state storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event channel server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Outbound frames buffered per connection before deliveries are dropped.
    #[serde(default = "default_connection_queue")]
    pub connection_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connection_queue: default_connection_queue(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8790
}

fn default_connection_queue() -> usize {
    256
}

/// Connection token configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify connection tokens.
    /// Required to serve.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Bearer token accepted by the HTTP publish endpoint.
    /// `None` disables HTTP publishing.
    #[serde(default)]
    pub service_token: Option<String>,
}

/// Client-side reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Interval of the correcting poll.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Age after which a story stops being active.
    #[serde(default = "default_story_ttl_hours")]
    pub story_ttl_hours: u32,

    /// Comments fetched per page.
    #[serde(default = "default_comment_page_size")]
    pub comment_page_size: u32,

    /// First delay before reconnecting a dropped channel.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Upper bound of the exponential reconnect delay.
    #[serde(default = "default_reconnect_max_backoff_ms")]
    pub reconnect_max_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            story_ttl_hours: default_story_ttl_hours(),
            comment_page_size: default_comment_page_size(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_max_backoff_ms: default_reconnect_max_backoff_ms(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_story_ttl_hours() -> u32 {
    24
}

fn default_comment_page_size() -> u32 {
    20
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

fn default_reconnect_max_backoff_ms() -> u64 {
    30_000
}

/// Durable view-state storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the SQLite file holding view-state cursors.
    #[serde(default = "default_view_state_path")]
    pub view_state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            view_state_path: default_view_state_path(),
        }
    }
}

fn default_view_state_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("ringcast").join("view-state.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("./ringcast-view-state.db"))
        .display()
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
