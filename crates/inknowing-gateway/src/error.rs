// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The REST error envelope: `{"error": {"kind", "message", "retryable"}}`.
//!
//! Raw provider text and internal detail never reach the wire; the
//! envelope is built from the taxonomy projection only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inknowing_core::{ErrorKind, InknowingError};
use serde::Serialize;

/// Envelope body.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
}

/// Wrapper giving runtime errors an HTTP rendering.
#[derive(Debug)]
pub struct ApiError(pub InknowingError);

impl From<InknowingError> for ApiError {
    fn from(error: InknowingError) -> Self {
        Self(error)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::SessionExpired => StatusCode::GONE,
        ErrorKind::BackpressureTimeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::ProviderTimeout
        | ErrorKind::ProviderError
        | ErrorKind::ProviderPartial => StatusCode::BAD_GATEWAY,
        ErrorKind::ProviderPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Persistence | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let reset_at = match &self.0 {
            InknowingError::QuotaExhausted { reset_at } => Some(reset_at.clone()),
            _ => None,
        };
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                kind,
                message: self.0.public_message(),
                retryable: kind.retryable(),
                reset_at,
            },
        };
        (status_for(kind), Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_envelope_has_hint_and_429() {
        let response = ApiError(InknowingError::QuotaExhausted {
            reset_at: "2026-03-02T00:00:00Z".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn not_found_is_404() {
        let response = ApiError(InknowingError::NotFound {
            resource: "book",
            id: "b9".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_detail_is_masked_in_body() {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                kind: ErrorKind::Internal,
                message: InknowingError::Internal("stack detail".into()).public_message(),
                retryable: false,
                reset_at: None,
            },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("stack detail"));
        assert!(json.contains("internal"));
    }
}
