// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ringcast serve`: run the gateway until a shutdown signal arrives.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ringcast_config::RingcastConfig;
use ringcast_core::RingcastError;
use ringcast_gateway::{Gateway, GatewayConfig};

pub async fn run_serve(config: RingcastConfig) -> Result<(), RingcastError> {
    init_tracing(&config.logging.level);

    let gateway = Gateway::new(gateway_config(&config)?);
    let listener = gateway.bind().await?;
    info!(
        queue = config.server.connection_queue,
        publish = config.auth.service_token.is_some(),
        "starting ringcast gateway"
    );

    let shutdown = install_signal_handler()?;
    gateway.serve(listener, shutdown).await?;

    let stats = gateway.hub().stats();
    info!(
        connections = stats.connections,
        rooms = stats.rooms,
        "gateway stopped"
    );
    Ok(())
}

/// The token secret, which every command that signs or verifies needs.
pub fn require_secret(config: &RingcastConfig) -> Result<&str, RingcastError> {
    config
        .auth
        .token_secret
        .as_deref()
        .ok_or_else(|| RingcastError::Config("auth.token_secret must be set".into()))
}

fn gateway_config(config: &RingcastConfig) -> Result<GatewayConfig, RingcastError> {
    Ok(GatewayConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        connection_queue: config.server.connection_queue,
        token_secret: require_secret(config)?.to_string(),
        service_token: config.auth.service_token.clone(),
    })
}

/// Cancel the returned token on SIGINT, or SIGTERM on unix.
fn install_signal_handler() -> Result<CancellationToken, RingcastError> {
    let token = CancellationToken::new();

    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())
            .map_err(|e| RingcastError::Internal(format!("failed to install SIGTERM handler: {e}")))?
    };

    let cancel = token.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, shutting down");
        }

        cancel.cancel();
        debug!("signal handler finished");
    });

    Ok(token)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ringcast={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_config_copies_server_and_auth_sections() {
        let mut config = RingcastConfig::default();
        config.server.port = 9100;
        config.server.connection_queue = 32;
        config.auth.token_secret = Some("0123456789abcdef-secret".into());
        config.auth.service_token = Some("svc".into());

        let gateway = gateway_config(&config).unwrap();
        assert_eq!(gateway.host, "127.0.0.1");
        assert_eq!(gateway.port, 9100);
        assert_eq!(gateway.connection_queue, 32);
        assert_eq!(gateway.token_secret, "0123456789abcdef-secret");
        assert_eq!(gateway.service_token.as_deref(), Some("svc"));
    }

    #[test]
    fn serving_without_secret_is_refused() {
        let err = gateway_config(&RingcastConfig::default()).unwrap_err();
        assert!(err.to_string().contains("token_secret"));
    }

    #[tokio::test]
    async fn signal_handler_returns_live_token() {
        let token = install_signal_handler().unwrap();
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
