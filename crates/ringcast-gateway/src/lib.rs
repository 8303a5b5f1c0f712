// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Ringcast event channel.
//!
//! Clients hold one WebSocket each and exchange join/leave/emit frames with
//! the [`RoomHub`]. Server-side producers publish over HTTP.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ringcast_bus::RoomHub;
use ringcast_core::RingcastError;

use crate::auth::{ServiceAuth, TokenSigner};
use crate::server::GatewayState;

/// Gateway configuration.
///
/// Mirrors the `[server]` and `[auth]` sections of `ringcast-config` so the
/// gateway does not depend on the config crate.
#[derive(Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Outbound frames buffered per connection.
    pub connection_queue: usize,
    /// Secret for connection tokens.
    pub token_secret: String,
    /// Bearer token for `/v1/publish` and `/v1/stats`.
    pub service_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connection_queue", &self.connection_queue)
            .field("token_secret", &"[redacted]")
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// The event channel server: a room hub plus its HTTP front.
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let state = GatewayState {
            hub: Arc::new(RoomHub::new(config.connection_queue)),
            tokens: TokenSigner::new(&config.token_secret),
            service: ServiceAuth {
                bearer_token: config.service_token.clone(),
            },
            start_time: std::time::Instant::now(),
        };
        Self { config, state }
    }

    /// The hub, for in-process producers.
    pub fn hub(&self) -> Arc<RoomHub> {
        Arc::clone(&self.state.hub)
    }

    pub fn tokens(&self) -> &TokenSigner {
        &self.state.tokens
    }

    pub fn router(&self) -> axum::Router {
        server::router(self.state.clone())
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, RingcastError> {
        server::bind(&self.config.host, self.config.port).await
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), RingcastError> {
        server::serve(listener, self.state.clone(), shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use ringcast_core::{PostId, Room};

    fn test_config(service_token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            connection_queue: 8,
            token_secret: "0123456789abcdef".to_string(),
            service_token: service_token.map(str::to_string),
        }
    }

    fn publish_body() -> String {
        serde_json::json!({
            "event": {
                "type": "commentDelete",
                "payload": {"postId": "P", "commentId": "c1", "actorId": "mod"},
                "timestamp": "2026-01-01T00:00:00Z"
            }
        })
        .to_string()
    }

    #[test]
    fn config_debug_redacts_secrets() {
        let debug = format!("{:?}", test_config(Some("svc-secret")));
        assert!(!debug.contains("0123456789abcdef"));
        assert!(!debug.contains("svc-secret"));
    }

    #[tokio::test]
    async fn health_is_public() {
        let gateway = Gateway::new(test_config(None));
        let response = gateway
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let health: handlers::HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn publish_without_service_token_is_rejected() {
        let gateway = Gateway::new(test_config(None));
        let response = gateway
            .router()
            .oneshot(
                Request::post("/v1/publish")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer anything")
                    .body(Body::from(publish_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn publish_routes_to_post_room() {
        let gateway = Gateway::new(test_config(Some("svc")));
        let hub = gateway.hub();
        let (conn, mut rx) = hub.connect();
        hub.join(&conn, &Room::Post(PostId::new("P"))).unwrap();

        let response = gateway
            .router()
            .oneshot(
                Request::post("/v1/publish")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer svc")
                    .body(Body::from(publish_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: handlers::PublishResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stats_count_connections() {
        let gateway = Gateway::new(test_config(Some("svc")));
        let hub = gateway.hub();
        let (_a, _rx_a) = hub.connect();
        let (_b, _rx_b) = hub.connect();
        let response = gateway
            .router()
            .oneshot(
                Request::get("/v1/stats")
                    .header("authorization", "Bearer svc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let stats: handlers::StatsResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.rooms, 1);
    }

    #[tokio::test]
    async fn ws_with_bad_token_is_unauthorized() {
        let gateway = Gateway::new(test_config(None));
        let response = gateway
            .router()
            .oneshot(
                Request::get("/ws?token=alice.00")
                    .header("connection", "upgrade")
                    .header("upgrade", "websocket")
                    .header("sec-websocket-version", "13")
                    .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    }
}
