// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::RingcastConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const MIN_SECRET_LEN: usize = 16;
const MAX_POLL_INTERVAL_SECS: u64 = 300;

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &RingcastConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.server.connection_queue == 0 {
        fail("server.connection_queue must be at least 1".to_string());
    }

    if let Some(secret) = &config.auth.token_secret
        && secret.len() < MIN_SECRET_LEN
    {
        fail(format!(
            "auth.token_secret must be at least {MIN_SECRET_LEN} bytes, got {}",
            secret.len()
        ));
    }

    if let Some(token) = &config.auth.service_token
        && token.trim().is_empty()
    {
        fail("auth.service_token must not be empty when set".to_string());
    }

    let poll = config.sync.poll_interval_secs;
    if !(1..=MAX_POLL_INTERVAL_SECS).contains(&poll) {
        fail(format!(
            "sync.poll_interval_secs must be between 1 and {MAX_POLL_INTERVAL_SECS}, got {poll}"
        ));
    }

    if config.sync.story_ttl_hours == 0 {
        fail("sync.story_ttl_hours must be positive".to_string());
    }

    if config.sync.comment_page_size == 0 {
        fail("sync.comment_page_size must be positive".to_string());
    }

    if config.sync.reconnect_backoff_ms == 0 {
        fail("sync.reconnect_backoff_ms must be positive".to_string());
    }

    if config.sync.reconnect_max_backoff_ms < config.sync.reconnect_backoff_ms {
        fail(format!(
            "sync.reconnect_max_backoff_ms ({}) must not be below sync.reconnect_backoff_ms ({})",
            config.sync.reconnect_max_backoff_ms, config.sync.reconnect_backoff_ms
        ));
    }

    if config.storage.view_state_path.trim().is_empty() {
        fail("storage.view_state_path must not be empty".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        fail(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&RingcastConfig::default()).is_ok());
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut config = RingcastConfig::default();
        config.auth.token_secret = Some("short".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("token_secret"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = RingcastConfig::default();
        config.sync.poll_interval_secs = 0;
        config.sync.story_ttl_hours = 0;
        config.logging.level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn backoff_bounds_are_ordered() {
        let mut config = RingcastConfig::default();
        config.sync.reconnect_backoff_ms = 5_000;
        config.sync.reconnect_max_backoff_ms = 1_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("reconnect_max_backoff_ms"));
    }

    #[test]
    fn invalid_host_is_rejected() {
        let mut config = RingcastConfig::default();
        config.server.host = "not a host!".into();
        assert!(validate_config(&config).is_err());
    }
}
