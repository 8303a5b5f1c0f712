// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication for the gateway.
//!
//! Two mechanisms:
//! 1. Connection tokens (`{user_id}.{hex hmac-sha256}`) presented on the
//!    WebSocket handshake bind a connection to a user.
//! 2. A static service bearer token guards the HTTP publish and stats routes.
//!    With no service token configured those routes reject everything.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use ringcast_core::{RingcastError, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies HMAC-signed connection tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, user: &str) -> Result<HmacSha256, RingcastError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| RingcastError::Internal(format!("invalid token secret: {e}")))?;
        mac.update(user.as_bytes());
        Ok(mac)
    }

    /// Mint a token binding the bearer to `user`.
    pub fn issue(&self, user: &UserId) -> Result<String, RingcastError> {
        let tag = self.mac(user.as_str())?.finalize().into_bytes();
        Ok(format!("{user}.{}", hex::encode(tag)))
    }

    /// Verify a token and return the user it names.
    pub fn verify(&self, token: &str) -> Result<UserId, RingcastError> {
        let (user, tag) = token
            .rsplit_once('.')
            .ok_or_else(|| RingcastError::Auth("malformed token".into()))?;
        if user.is_empty() {
            return Err(RingcastError::Auth("token names no user".into()));
        }
        let tag = hex::decode(tag).map_err(|_| RingcastError::Auth("malformed token".into()))?;
        self.mac(user)?
            .verify_slice(&tag)
            .map_err(|_| RingcastError::Auth("bad token signature".into()))?;
        Ok(UserId::new(user))
    }
}

/// Expected service bearer token, if HTTP publishing is enabled.
#[derive(Clone)]
pub struct ServiceAuth {
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ServiceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAuth")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Middleware requiring `Authorization: Bearer <service token>`.
pub async fn service_auth_middleware(
    State(auth): State<ServiceAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.bearer_token.as_deref() else {
        tracing::warn!("no service token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
