// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Routes: unauthenticated `/health` and `/metrics`, bearer-authenticated
//! dialogue REST endpoints, and the WebSocket upgrade (which authenticates
//! during the handshake).

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use inknowing_config::model::GatewayConfig;
use inknowing_core::InknowingError;
use inknowing_session::SessionManager;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::ws;

/// State for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub manager: Arc<SessionManager>,
    pub auth: AuthConfig,
    pub config: GatewayConfig,
    pub health: HealthState,
}

/// Build the full gateway router.
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/dialogues/book/start", post(handlers::start_book_dialogue))
        .route(
            "/dialogues/character/start",
            post(handlers::start_character_dialogue),
        )
        .route("/dialogues/history", get(handlers::get_history))
        .route(
            "/dialogues/{session_id}/messages",
            post(handlers::post_message).get(handlers::get_messages),
        )
        .route("/dialogues/{session_id}/context", get(handlers::get_context))
        .route(
            "/dialogues/{session_id}",
            axum::routing::delete(handlers::close_dialogue),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // WebSocket auth happens during the handshake, not via middleware.
    let ws_routes = Router::new()
        .route("/dialogue/{session_id}", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown token fires.
pub async fn start_server(
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), InknowingError> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| InknowingError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| InknowingError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
