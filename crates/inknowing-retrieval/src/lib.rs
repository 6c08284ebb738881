// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval index adapter: semantic search over a book's vector chunks.

pub mod index;
pub mod types;

pub use index::SqliteRetrievalIndex;
pub use types::{blob_to_vec, cosine_similarity, vec_to_blob};
