// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn requests and the event stream a turn produces.

use inknowing_core::types::{Reference, TokenUsage};
use inknowing_core::{ErrorKind, InknowingError, MembershipTier};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One queued user turn, delivered to the owning session worker.
pub struct TurnRequest {
    pub utterance: String,
    pub tier: MembershipTier,
    /// Sink for the turn's event stream. Bounded; the worker's sends
    /// propagate client backpressure.
    pub events: mpsc::Sender<TurnEvent>,
    /// Cooperative cancellation signal from the client's `cancel` frame.
    pub cancel: CancellationToken,
}

/// Events emitted while a turn runs. `Done` or `Error` is always last.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Generation is underway.
    Typing(bool),
    /// One streamed token delta, in generation order.
    Token(String),
    /// A citation for the upcoming assistant message.
    Reference(Reference),
    /// Terminal success.
    Done {
        message_id: String,
        usage: TokenUsage,
        partial: bool,
    },
    /// Terminal failure.
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
        reset_at: Option<String>,
    },
}

impl TurnEvent {
    /// Build the terminal error event for a runtime error.
    pub fn from_error(error: &InknowingError) -> Self {
        let kind = error.kind();
        let reset_at = match error {
            InknowingError::QuotaExhausted { reset_at } => Some(reset_at.clone()),
            _ => None,
        };
        TurnEvent::Error {
            kind,
            message: error.public_message(),
            retryable: kind.retryable(),
            reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_carries_reset_hint() {
        let err = InknowingError::QuotaExhausted {
            reset_at: "2026-03-02T00:00:00Z".into(),
        };
        match TurnEvent::from_error(&err) {
            TurnEvent::Error {
                kind,
                retryable,
                reset_at,
                ..
            } => {
                assert_eq!(kind, ErrorKind::QuotaExhausted);
                assert!(!retryable);
                assert_eq!(reset_at.as_deref(), Some("2026-03-02T00:00:00Z"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn internal_error_is_masked() {
        let err = InknowingError::Internal("secret stack detail".into());
        match TurnEvent::from_error(&err) {
            TurnEvent::Error { message, kind, .. } => {
                assert_eq!(kind, ErrorKind::Internal);
                assert!(!message.contains("secret"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
