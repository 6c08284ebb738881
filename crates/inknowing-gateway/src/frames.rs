// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex frame shapes for the dialogue WebSocket.
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "message", "content": "Summarize chapter 1"}
//! {"type": "cancel"}
//! {"type": "ping"}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "typing", "on": true}
//! {"type": "token", "delta": "partial"}
//! {"type": "reference", "source": "paragraph", "excerpt": "...", "similarity": 0.82}
//! {"type": "done", "message_id": "...", "usage": {"input": 120, "output": 56}, "partial": false}
//! {"type": "error", "kind": "quota_exhausted", "message": "...", "retryable": false}
//! {"type": "pong"}
//! ```

use inknowing_core::types::Reference;
use inknowing_core::ErrorKind;
use inknowing_session::TurnEvent;
use serde::{Deserialize, Serialize};

/// Frames the client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Submit one user turn.
    Message { content: String },
    /// Cooperatively cancel the in-flight turn.
    Cancel,
    /// Application-level keepalive; answered with `pong`.
    Ping,
}

/// Token usage reported on the terminal `done` frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageBody {
    pub input: u32,
    pub output: u32,
}

/// Frames the server sends. `done` or `error` terminates a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Typing {
        on: bool,
    },
    Token {
        delta: String,
    },
    Reference {
        #[serde(flatten)]
        reference: Reference,
    },
    Done {
        message_id: String,
        usage: UsageBody,
        partial: bool,
    },
    Error {
        kind: ErrorKind,
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reset_at: Option<String>,
    },
    Pong,
}

impl ServerFrame {
    /// Map a worker turn event onto its wire frame.
    pub fn from_event(event: TurnEvent) -> Self {
        match event {
            TurnEvent::Typing(on) => ServerFrame::Typing { on },
            TurnEvent::Token(delta) => ServerFrame::Token { delta },
            TurnEvent::Reference(reference) => ServerFrame::Reference { reference },
            TurnEvent::Done {
                message_id,
                usage,
                partial,
            } => ServerFrame::Done {
                message_id,
                usage: UsageBody {
                    input: usage.input_tokens,
                    output: usage.output_tokens,
                },
                partial,
            },
            TurnEvent::Error {
                kind,
                message,
                retryable,
                reset_at,
            } => ServerFrame::Error {
                kind,
                message,
                retryable,
                reset_at,
            },
        }
    }

    /// Whether this frame terminates the current turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerFrame::Done { .. } | ServerFrame::Error { .. })
    }
}
