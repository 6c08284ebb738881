// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dialogue WebSocket: one connection, one session, serialized turns.
//!
//! Upgrade happens only after bearer verification and an ownership check.
//! Turns run one at a time; `cancel` reaches the in-flight turn between
//! frames. Server-to-client emission respects the slowest consumer through
//! a bounded out-queue with a drain ceiling; protocol-level pings every
//! `ping_interval` guard liveness, and a missed pong deadline closes the
//! connection while the worker (and session) survive for reconnection.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use inknowing_core::types::Principal;
use inknowing_session::TurnEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::frames::{ClientFrame, ServerFrame};
use crate::server::GatewayState;

/// Per-connection out-queue depth. Filling it means the client is not
/// draining; the send timeout then enforces the backpressure ceiling.
const OUT_QUEUE_CAPACITY: usize = 64;

/// Queued-but-unstarted turns per connection.
const TURN_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token alternative for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /dialogue/{session_id} upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    let header_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = header_token.or(query.token);

    let Some(principal) = token.and_then(|t| state.auth.verify(&t)) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    // Ownership is checked before the upgrade completes.
    if let Err(e) = state.manager.load_owned(&principal, &session_id).await {
        return ApiError(e).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal, session_id))
}

async fn handle_socket(
    socket: WebSocket,
    state: GatewayState,
    principal: Principal,
    session_id: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn_cancel = CancellationToken::new();
    let last_pong = Arc::new(Mutex::new(Instant::now()));
    let current_turn: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUT_QUEUE_CAPACITY);
    let (turn_tx, turn_rx) = mpsc::channel::<String>(TURN_QUEUE_CAPACITY);

    // Sender task: the only writer to the socket.
    let sender_cancel = conn_cancel.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                sender_cancel.cancel();
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Keepalive task: protocol pings and the pong deadline.
    let ping_interval = Duration::from_secs(state.config.ping_interval_seconds);
    let pong_deadline = Duration::from_secs(state.config.pong_deadline_seconds);
    let keepalive_out = out_tx.clone();
    let keepalive_pong = last_pong.clone();
    let keepalive_cancel = conn_cancel.clone();
    let keepalive_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if keepalive_pong.lock().expect("pong clock poisoned").elapsed() > pong_deadline {
                        debug!("pong deadline missed, closing connection");
                        keepalive_cancel.cancel();
                        break;
                    }
                    if keepalive_out.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                _ = keepalive_cancel.cancelled() => break,
            }
        }
    });

    // Turn runner: serializes turns for this connection.
    let runner_state = state.clone();
    let runner_principal = principal.clone();
    let runner_session = session_id.clone();
    let runner_out = out_tx.clone();
    let runner_current = current_turn.clone();
    let runner_cancel = conn_cancel.clone();
    let backpressure = Duration::from_secs(state.config.backpressure_timeout_seconds);
    let runner_task = tokio::spawn(run_turns(
        runner_state,
        runner_principal,
        runner_session,
        turn_rx,
        runner_out,
        runner_current,
        runner_cancel,
        backpressure,
    ));

    // Receiver loop: client frames and protocol pongs.
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        let frame: ClientFrame = match serde_json::from_str(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "invalid client frame");
                                continue;
                            }
                        };
                        match frame {
                            ClientFrame::Message { content } => {
                                if turn_tx.try_send(content).is_err() {
                                    let busy = ServerFrame::Error {
                                        kind: inknowing_core::ErrorKind::Internal,
                                        message: "too many queued turns".to_string(),
                                        retryable: true,
                                        reset_at: None,
                                    };
                                    send_frame(&out_tx, &busy, backpressure).await;
                                }
                            }
                            ClientFrame::Cancel => {
                                if let Some(cancel) =
                                    current_turn.lock().expect("turn slot poisoned").as_ref()
                                {
                                    cancel.cancel();
                                }
                            }
                            ClientFrame::Ping => {
                                send_frame(&out_tx, &ServerFrame::Pong, backpressure).await;
                            }
                        }
                    }
                    Message::Pong(_) => {
                        *last_pong.lock().expect("pong clock poisoned") = Instant::now();
                    }
                    Message::Close(_) => break,
                    // Protocol pings are answered by the websocket layer.
                    _ => {}
                }
            }
            _ = conn_cancel.cancelled() => break,
        }
    }

    // Disconnection is not cancellation: in-flight work continues and the
    // next connection can replay the persisted result.
    conn_cancel.cancel();
    drop(turn_tx);
    drop(out_tx);
    let _ = runner_task.await;
    keepalive_task.abort();
    let _ = sender_task.await;
    debug!(session_id = session_id.as_str(), "websocket connection closed");
}

#[allow(clippy::too_many_arguments)]
async fn run_turns(
    state: GatewayState,
    principal: Principal,
    session_id: String,
    mut turn_rx: mpsc::Receiver<String>,
    out_tx: mpsc::Sender<Message>,
    current_turn: Arc<Mutex<Option<CancellationToken>>>,
    conn_cancel: CancellationToken,
    backpressure: Duration,
) {
    while let Some(content) = turn_rx.recv().await {
        let cancel = CancellationToken::new();
        *current_turn.lock().expect("turn slot poisoned") = Some(cancel.clone());

        match state
            .manager
            .submit_turn(&principal, &session_id, content, cancel)
            .await
        {
            Ok(mut events) => {
                while let Some(event) = events.recv().await {
                    let frame = ServerFrame::from_event(event);
                    let terminal = frame.is_terminal();
                    if !send_frame(&out_tx, &frame, backpressure).await {
                        // Backpressure ceiling or closed socket: sever the
                        // connection; the worker runs on to completion.
                        warn!(
                            session_id = session_id.as_str(),
                            "token stream not drained in time, disconnecting"
                        );
                        metrics::counter!("gateway_backpressure_disconnects_total").increment(1);
                        conn_cancel.cancel();
                        *current_turn.lock().expect("turn slot poisoned") = None;
                        return;
                    }
                    if terminal {
                        break;
                    }
                }
            }
            Err(e) => {
                let frame = ServerFrame::from_event(TurnEvent::from_error(&e));
                if !send_frame(&out_tx, &frame, backpressure).await {
                    conn_cancel.cancel();
                    *current_turn.lock().expect("turn slot poisoned") = None;
                    return;
                }
            }
        }

        *current_turn.lock().expect("turn slot poisoned") = None;
    }
}

/// Send one frame within the backpressure ceiling. False means the
/// connection is beyond saving.
async fn send_frame(
    out_tx: &mpsc::Sender<Message>,
    frame: &ServerFrame,
    backpressure: Duration,
) -> bool {
    let Ok(text) = serde_json::to_string(frame) else {
        return true;
    };
    matches!(
        tokio::time::timeout(backpressure, out_tx.send(Message::Text(text.into()))).await,
        Ok(Ok(()))
    )
}
