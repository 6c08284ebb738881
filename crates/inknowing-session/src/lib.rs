// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle and turn processing for the InKnowing dialogue runtime.
//!
//! One worker task per active session serializes that session's turns
//! through the Reserving -> Assembling -> Generating -> Persisting state
//! machine; the manager owns the worker table and the public contract.

pub mod manager;
pub mod turn;
mod worker;

pub use manager::{ContextView, SessionManager};
pub use turn::{TurnEvent, TurnRequest};
