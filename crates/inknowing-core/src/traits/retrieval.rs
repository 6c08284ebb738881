// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval index trait: semantic search over a book's vector chunks.

use async_trait::async_trait;

use crate::error::InknowingError;
use crate::traits::adapter::PluginAdapter;
use crate::types::RetrievedChunk;

/// Uniform read interface over the external vector store, scoped by book.
///
/// Implementations handle their own retry; a soft failure (store or
/// embedder unavailable) returns an empty list rather than an error so a
/// turn can proceed without citations.
#[async_trait]
pub trait RetrievalIndex: PluginAdapter {
    /// Returns the `k` highest-similarity chunks for `query` within `book_id`,
    /// ordered by similarity descending.
    async fn top_k(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
        chapter_range: Option<(i64, i64)>,
    ) -> Result<Vec<RetrievedChunk>, InknowingError>;
}
