// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the InKnowing dialogue runtime.
//!
//! Provides the foundational trait definitions, error taxonomy, and shared
//! domain types used throughout the workspace. Provider and retrieval
//! backends implement the traits defined here.

pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;

pub use error::{ErrorKind, InknowingError};
pub use types::{
    AdapterType, HealthStatus, MembershipTier, MessageRole, PeriodKind, Principal,
    SessionKind, SessionStatus, TokenUsage,
};

pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter, RetrievalIndex};
