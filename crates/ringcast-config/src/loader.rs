// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/ringcast/ringcast.toml`, `~/.config/ringcast/ringcast.toml`,
//! `./ringcast.toml`, then `RINGCAST_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RingcastConfig;
use crate::{CONFIG_FILE, SYSTEM_CONFIG};

/// Sections that environment variables may address.
const SECTIONS: &[&str] = &["server", "auth", "sync", "storage", "logging"];

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<RingcastConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RingcastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingcastConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RingcastConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingcastConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used for the standard hierarchy, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RingcastConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("ringcast").join(CONFIG_FILE))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(CONFIG_FILE))
        .merge(env_provider())
}

/// Maps `RINGCAST_SYNC_POLL_INTERVAL_SECS` to `sync.poll_interval_secs`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// key names keep their own underscores.
fn env_provider() -> Env {
    Env::prefixed("RINGCAST_").map(|key| {
        let key_str = key.as_str();
        for section in SECTIONS {
            if let Some(rest) = key_str
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.to_string().into()
    })
}
