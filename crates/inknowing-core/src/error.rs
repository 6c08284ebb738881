// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the InKnowing dialogue runtime.
//!
//! Recoverable outcomes (quota exhaustion, provider faults) travel as
//! `Result` values through the whole stack. [`ErrorKind`] is the wire-level
//! projection used by the gateway error envelope.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all runtime components.
#[derive(Debug, Error)]
pub enum InknowingError {
    /// Missing, invalid, or ownership-mismatched credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A referenced book, character, or session does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The principal may not access the referenced resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The user has no dialogue budget left for the current period.
    #[error("dialogue quota exhausted, resets at {reset_at}")]
    QuotaExhausted { reset_at: String },

    /// The session idled past its timeout and was expired.
    #[error("session {session_id} has expired")]
    SessionExpired { session_id: String },

    /// The client failed to drain the token stream within the ceiling.
    #[error("client did not drain token stream in time")]
    BackpressureTimeout,

    /// A provider call exceeded its wall-clock deadline.
    #[error("provider call timed out after {seconds}s")]
    ProviderTimeout { seconds: u64 },

    /// Upstream provider failure (API error, malformed stream).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider stream failed after tokens were already delivered.
    /// The turn keeps what was produced; no failover is attempted.
    #[error("provider failed mid-stream after {emitted} tokens")]
    ProviderPartial { emitted: u64 },

    /// Every candidate descriptor for the request is marked down.
    #[error("no healthy model available for this request")]
    ProviderPoolExhausted,

    /// Journal write failure (database connection, query, transaction).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors. Never exposed verbatim to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Wire-level error classification used in the gateway error envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    NotFound,
    Forbidden,
    QuotaExhausted,
    SessionExpired,
    BackpressureTimeout,
    ProviderTimeout,
    ProviderError,
    ProviderPartial,
    ProviderPoolExhausted,
    Persistence,
    Internal,
}

impl ErrorKind {
    /// Whether a client may usefully retry the same request.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ProviderTimeout
                | ErrorKind::ProviderError
                | ErrorKind::ProviderPoolExhausted
                | ErrorKind::Persistence
        )
    }
}

impl InknowingError {
    /// Projects this error onto the wire-level [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InknowingError::Auth(_) => ErrorKind::Auth,
            InknowingError::NotFound { .. } => ErrorKind::NotFound,
            InknowingError::Forbidden(_) => ErrorKind::Forbidden,
            InknowingError::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            InknowingError::SessionExpired { .. } => ErrorKind::SessionExpired,
            InknowingError::BackpressureTimeout => ErrorKind::BackpressureTimeout,
            InknowingError::ProviderTimeout { .. } => ErrorKind::ProviderTimeout,
            InknowingError::Provider { .. } => ErrorKind::ProviderError,
            InknowingError::ProviderPartial { .. } => ErrorKind::ProviderPartial,
            InknowingError::ProviderPoolExhausted => ErrorKind::ProviderPoolExhausted,
            InknowingError::Storage { .. } => ErrorKind::Persistence,
            InknowingError::Config(_) | InknowingError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to surface to clients. Raw provider text and storage
    /// detail are masked; only the taxonomy reaches the wire.
    pub fn public_message(&self) -> String {
        match self {
            InknowingError::Provider { .. } => {
                "the model provider returned an error".to_string()
            }
            InknowingError::Storage { .. } => {
                "the reply could not be saved; please retry".to_string()
            }
            _ => match self.kind() {
                ErrorKind::Internal => "an internal error occurred".to_string(),
                _ => self.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_projection_covers_taxonomy() {
        let err = InknowingError::QuotaExhausted {
            reset_at: "2026-03-02T00:00:00Z".into(),
        };
        assert_eq!(err.kind(), ErrorKind::QuotaExhausted);
        assert!(!err.kind().retryable());

        let err = InknowingError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.kind().retryable());
    }

    #[test]
    fn provider_partial_is_not_retryable() {
        let err = InknowingError::ProviderPartial { emitted: 3 };
        assert_eq!(err.kind(), ErrorKind::ProviderPartial);
        assert!(!err.kind().retryable());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::QuotaExhausted).unwrap();
        assert_eq!(json, "\"quota_exhausted\"");
        let parsed = ErrorKind::from_str("session_expired").unwrap();
        assert_eq!(parsed, ErrorKind::SessionExpired);
    }

    #[test]
    fn internal_errors_are_masked() {
        let err = InknowingError::Internal("prompt assembly overflowed at index 7".into());
        assert_eq!(err.public_message(), "an internal error occurred");

        let err = InknowingError::SessionExpired {
            session_id: "s1".into(),
        };
        assert!(err.public_message().contains("s1"));
    }

    #[test]
    fn raw_provider_text_never_reaches_clients() {
        let err = InknowingError::Provider {
            message: "Anthropic API error (overloaded_error): upstream secret detail".into(),
            source: None,
        };
        assert!(!err.public_message().contains("overloaded_error"));
        assert!(!err.public_message().contains("secret"));

        let err = InknowingError::Storage {
            source: Box::new(std::io::Error::other("/var/lib/inknowing/inknowing.db is full")),
        };
        assert!(!err.public_message().contains("/var/lib"));
    }
}
