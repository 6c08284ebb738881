// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST handlers: one-shot turns for non-streaming clients, paged reads,
//! and the context endpoint. Semantics match the WebSocket path exactly;
//! the handler just collects the event stream into one response.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inknowing_core::types::{Principal, Reference, Session};
use inknowing_core::{ErrorKind, InknowingError, SessionKind};
use inknowing_session::{ContextView, TurnEvent};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ErrorBody, ErrorEnvelope};
use crate::frames::UsageBody;
use crate::server::GatewayState;

/// Body for POST /dialogues/book/start.
#[derive(Debug, Deserialize)]
pub struct StartBookRequest {
    pub book_id: String,
    #[serde(default)]
    pub initial_question: Option<String>,
}

/// Body for POST /dialogues/character/start.
#[derive(Debug, Deserialize)]
pub struct StartCharacterRequest {
    pub book_id: String,
    pub character_id: String,
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Body for POST /dialogues/{session_id}/messages.
#[derive(Debug, Deserialize)]
pub struct TurnRequestBody {
    pub content: String,
}

/// A completed assistant message on the wire.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub id: String,
    pub role: String,
    pub content: String,
    pub partial: bool,
}

/// Response for the start endpoints.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message: Option<MessageBody>,
}

/// Response for the one-shot turn endpoint.
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub message: MessageBody,
    pub references: Vec<Reference>,
    pub usage: UsageBody,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub cursor: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessagesPage {
    pub messages: Vec<inknowing_core::types::Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub sessions: Vec<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One fully-collected turn.
struct CollectedTurn {
    message: MessageBody,
    references: Vec<Reference>,
    usage: UsageBody,
}

/// Run a turn to completion and collect its stream.
async fn run_turn(
    state: &GatewayState,
    principal: &Principal,
    session_id: &str,
    content: String,
) -> Result<CollectedTurn, Response> {
    let mut events = state
        .manager
        .submit_turn(principal, session_id, content, CancellationToken::new())
        .await
        .map_err(|e| ApiError(e).into_response())?;

    let mut text = String::new();
    let mut references = Vec::new();
    let mut done: Option<(String, UsageBody, bool)> = None;

    while let Some(event) = events.recv().await {
        match event {
            TurnEvent::Token(delta) => text.push_str(&delta),
            TurnEvent::Reference(reference) => references.push(reference),
            TurnEvent::Done {
                message_id,
                usage,
                partial,
            } => {
                done = Some((
                    message_id,
                    UsageBody {
                        input: usage.input_tokens,
                        output: usage.output_tokens,
                    },
                    partial,
                ));
            }
            TurnEvent::Error {
                kind,
                message,
                retryable,
                reset_at,
            } => {
                return Err(turn_error_response(kind, message, retryable, reset_at));
            }
            TurnEvent::Typing(_) => {}
        }
    }

    let (message_id, usage, partial) = done.ok_or_else(|| {
        ApiError(InknowingError::Internal(
            "turn ended without a terminal event".into(),
        ))
        .into_response()
    })?;

    Ok(CollectedTurn {
        message: MessageBody {
            id: message_id,
            role: "assistant".to_string(),
            content: text,
            partial,
        },
        references,
        usage,
    })
}

fn turn_error_response(
    kind: ErrorKind,
    message: String,
    retryable: bool,
    reset_at: Option<String>,
) -> Response {
    let status = match kind {
        ErrorKind::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::SessionExpired => StatusCode::GONE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProviderPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ProviderTimeout | ErrorKind::ProviderError | ErrorKind::ProviderPartial => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorEnvelope {
            error: ErrorBody {
                kind,
                message,
                retryable,
                reset_at,
            },
        }),
    )
        .into_response()
}

/// POST /dialogues/book/start
pub async fn start_book_dialogue(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<StartBookRequest>,
) -> Response {
    let session = match state
        .manager
        .start(
            &principal,
            &body.book_id,
            SessionKind::Book,
            None,
            body.initial_question.is_some(),
        )
        .await
    {
        Ok(session) => session,
        Err(e) => return ApiError(e).into_response(),
    };

    let first_message = match body.initial_question {
        Some(question) => match run_turn(&state, &principal, &session.id, question).await {
            Ok(turn) => Some(turn.message),
            Err(response) => return response,
        },
        None => None,
    };

    Json(StartResponse {
        session_id: session.id,
        first_message,
    })
    .into_response()
}

/// POST /dialogues/character/start
pub async fn start_character_dialogue(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<StartCharacterRequest>,
) -> Response {
    let session = match state
        .manager
        .start(
            &principal,
            &body.book_id,
            SessionKind::Character,
            Some(body.character_id),
            body.initial_message.is_some(),
        )
        .await
    {
        Ok(session) => session,
        Err(e) => return ApiError(e).into_response(),
    };

    let first_message = match body.initial_message {
        Some(message) => match run_turn(&state, &principal, &session.id, message).await {
            Ok(turn) => Some(turn.message),
            Err(response) => return response,
        },
        None => None,
    };

    Json(StartResponse {
        session_id: session.id,
        first_message,
    })
    .into_response()
}

/// POST /dialogues/{session_id}/messages: one-shot synchronous turn.
pub async fn post_message(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
    Json(body): Json<TurnRequestBody>,
) -> Response {
    match run_turn(&state, &principal, &session_id, body.content).await {
        Ok(turn) => Json(TurnResponse {
            message: turn.message,
            references: turn.references,
            usage: turn.usage,
        })
        .into_response(),
        Err(response) => response,
    }
}

/// GET /dialogues/{session_id}/messages: paged history.
pub async fn get_messages(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    if let Err(e) = state.manager.load_owned(&principal, &session_id).await {
        return ApiError(e).into_response();
    }
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    match state
        .manager
        .journal()
        .get_messages(&session_id, query.cursor, limit)
        .await
    {
        Ok(messages) => {
            let next_cursor = (messages.len() as i64 == limit)
                .then(|| messages.last().map(|m| m.seq))
                .flatten();
            Json(MessagesPage {
                messages,
                next_cursor,
            })
            .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// DELETE /dialogues/{session_id}: explicit close. Idempotent.
pub async fn close_dialogue(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .close(&principal, &session_id, "client request")
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /dialogues/{session_id}/context: context snapshot.
pub async fn get_context(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Path(session_id): Path<String>,
) -> Result<Json<ContextView>, ApiError> {
    let view = state.manager.context_of(&principal, &session_id).await?;
    Ok(Json(view))
}

/// GET /dialogues/history: the caller's sessions, most recent first.
pub async fn get_history(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let sessions = state
        .manager
        .journal()
        .list_by_user(&principal.user_id, query.cursor, limit)
        .await?;
    let next_cursor = (sessions.len() as i64 == limit)
        .then(|| sessions.last().map(|s| s.last_activity_at.clone()))
        .flatten();
    Ok(Json(HistoryPage {
        sessions,
        next_cursor,
    }))
}

/// GET /health: unauthenticated liveness.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        active_sessions: state.manager.active_workers(),
    })
}

/// GET /metrics: Prometheus render when a recorder is installed.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not configured").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_book_request_deserializes() {
        let body: StartBookRequest =
            serde_json::from_str(r#"{"book_id": "b1", "initial_question": "hi"}"#).unwrap();
        assert_eq!(body.book_id, "b1");
        assert_eq!(body.initial_question.as_deref(), Some("hi"));

        let body: StartBookRequest = serde_json::from_str(r#"{"book_id": "b1"}"#).unwrap();
        assert!(body.initial_question.is_none());
    }

    #[test]
    fn start_response_omits_absent_first_message() {
        let json = serde_json::to_string(&StartResponse {
            session_id: "s1".into(),
            first_message: None,
        })
        .unwrap();
        assert!(!json.contains("first_message"));
    }

    #[test]
    fn turn_error_maps_quota_to_429() {
        let response = turn_error_response(
            ErrorKind::QuotaExhausted,
            "out of budget".into(),
            false,
            Some("2026-03-02T00:00:00Z".into()),
        );
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
