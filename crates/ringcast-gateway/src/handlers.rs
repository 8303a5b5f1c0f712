// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers: health, stats and server-side publishing.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use ringcast_core::{FanoutEvent, Room};

use crate::server::GatewayState;

/// Request body for `POST /v1/publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub event: FanoutEvent,
    /// Explicit target rooms; the event's routing rooms when omitted.
    #[serde(default)]
    pub rooms: Option<Vec<Room>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Connections that accepted the event.
    pub delivered: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /v1/stats
pub async fn get_stats(State(state): State<GatewayState>) -> Json<StatsResponse> {
    let stats = state.hub.stats();
    Json(StatsResponse {
        connections: stats.connections,
        rooms: stats.rooms,
    })
}

/// POST /v1/publish
///
/// Fans an event out on behalf of a server-side producer (CRUD handlers,
/// moderation, feature flag toggles). The event is re-stamped with the
/// current time and carries no origin connection.
pub async fn post_publish(
    State(state): State<GatewayState>,
    Json(body): Json<PublishRequest>,
) -> impl IntoResponse {
    let mut event = body.event;
    event.timestamp = chrono::Utc::now();
    event.origin = None;

    let rooms = body.rooms.unwrap_or_else(|| event.rooms());
    if rooms.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "no target rooms".to_string(),
            }),
        )
            .into_response();
    }

    let delivered = state.hub.publish(&event, &rooms);
    tracing::info!(kind = %event.event_type(), delivered, "server event published");
    (StatusCode::OK, Json(PublishResponse { delivered })).into_response()
}
