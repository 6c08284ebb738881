// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport gateway for the InKnowing dialogue runtime.
//!
//! Terminates client connections, verifies bearer credentials, and routes
//! turns to the session manager: a duplex WebSocket per session for
//! streaming clients and an equivalent one-shot REST surface.

pub mod auth;
pub mod error;
pub mod frames;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use frames::{ClientFrame, ServerFrame};
pub use server::{build_router, start_server, GatewayState, HealthState};
