// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared testing utilities for the InKnowing runtime workspace.
//!
//! Mock provider with scripted streaming behaviors, a deterministic
//! embedder, and standard catalog fixtures.

pub mod fixtures;
pub mod mock_provider;

pub use fixtures::{hash_embedder, seed_catalog, HashEmbedder, EMBED_DIM};
pub use mock_provider::{MockBehavior, MockProvider};
