// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer credential verification.
//!
//! Tokens are compact HMAC-SHA256-signed strings issued by the identity
//! service: `user_id.tier.expiry_unix.signature_hex`, signed over
//! `user_id.tier.expiry_unix`. The runtime reads nothing from the
//! credential beyond the user id and membership tier claim.
//!
//! With no signing key configured, every request is rejected (fail-closed).

use std::str::FromStr;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use inknowing_core::types::Principal;
use inknowing_core::MembershipTier;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Gateway authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing key. `None` rejects all requests.
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("key", &self.key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl AuthConfig {
    /// Build from the configured hex-encoded signing key.
    pub fn from_hex_key(hex_key: Option<&str>) -> Self {
        let key = hex_key.and_then(|k| hex::decode(k).ok());
        Self { key }
    }

    /// Build from a raw key (tests and tooling).
    pub fn from_raw_key(key: &[u8]) -> Self {
        Self {
            key: Some(key.to_vec()),
        }
    }

    /// Verify a bearer token and extract its principal.
    pub fn verify(&self, token: &str) -> Option<Principal> {
        let key = self.key.as_ref()?;

        let mut parts = token.rsplitn(2, '.');
        let signature_hex = parts.next()?;
        let payload = parts.next()?;

        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(payload.as_bytes());
        let signature = hex::decode(signature_hex).ok()?;
        // Constant-time comparison.
        mac.verify_slice(&signature).ok()?;

        let mut fields = payload.split('.');
        let user_id = fields.next()?;
        let tier = MembershipTier::from_str(fields.next()?).ok()?;
        let expiry: i64 = fields.next()?.parse().ok()?;
        if fields.next().is_some() || user_id.is_empty() {
            return None;
        }
        if expiry <= chrono::Utc::now().timestamp() {
            return None;
        }

        Some(Principal {
            user_id: user_id.to_string(),
            tier,
        })
    }

    /// Sign a token for a principal (identity-service side; used by tests
    /// and the operator CLI).
    pub fn issue(&self, user_id: &str, tier: MembershipTier, expiry_unix: i64) -> Option<String> {
        let key = self.key.as_ref()?;
        let payload = format!("{user_id}.{tier}.{expiry_unix}");
        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Some(format!("{payload}.{signature}"))
    }
}

/// Pull the bearer token out of an Authorization header value.
fn bearer_of(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

/// Middleware validating the bearer credential and stashing the verified
/// [`Principal`] in request extensions.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    match bearer_of(header).and_then(|token| auth.verify(token)) {
        Some(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
