// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed retrieval index over embedding-BLOB book chunks.
//!
//! Query embedding goes through the configured [`EmbeddingAdapter`]; chunk
//! similarity is cosine over the stored vectors. Soft failures (embedder or
//! store unavailable) degrade to an empty result after one retry so a turn
//! can proceed without citations.

use std::sync::Arc;

use async_trait::async_trait;
use inknowing_core::types::{
    AdapterType, EmbeddingInput, HealthStatus, RetrievedChunk,
};
use inknowing_core::{EmbeddingAdapter, InknowingError, PluginAdapter, RetrievalIndex};
use inknowing_storage::Journal;
use tracing::{debug, warn};

use crate::types::{blob_to_vec, cosine_similarity};

/// Retrieval index over the journal's chunk store.
pub struct SqliteRetrievalIndex {
    journal: Journal,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl SqliteRetrievalIndex {
    pub fn new(journal: Journal, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self { journal, embedder }
    }

    /// Embed the query, retrying once on failure.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        for attempt in 0..2 {
            match self
                .embedder
                .embed(EmbeddingInput {
                    texts: vec![query.to_string()],
                })
                .await
            {
                Ok(output) => match output.embeddings.into_iter().next() {
                    Some(embedding) => return Some(embedding),
                    None => {
                        warn!("embedder returned no vectors");
                        return None;
                    }
                },
                Err(e) => {
                    warn!(error = %e, attempt, "query embedding failed");
                }
            }
        }
        None
    }
}

#[async_trait]
impl PluginAdapter for SqliteRetrievalIndex {
    fn name(&self) -> &str {
        "sqlite-retrieval"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Retrieval
    }

    async fn health_check(&self) -> Result<HealthStatus, InknowingError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), InknowingError> {
        Ok(())
    }
}

#[async_trait]
impl RetrievalIndex for SqliteRetrievalIndex {
    async fn top_k(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
        chapter_range: Option<(i64, i64)>,
    ) -> Result<Vec<RetrievedChunk>, InknowingError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let Some(query_embedding) = self.embed_query(query).await else {
            // Soft failure: the turn proceeds without retrieval.
            return Ok(vec![]);
        };

        let rows = match self.journal.get_chunks(book_id, chapter_range).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, book_id, "chunk load failed, returning empty retrieval");
                return Ok(vec![]);
            }
        };

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .filter_map(|row| {
                let embedding = blob_to_vec(&row.embedding);
                if embedding.len() != query_embedding.len() {
                    return None;
                }
                let similarity = cosine_similarity(&query_embedding, &embedding);
                Some(RetrievedChunk {
                    chunk_id: row.id,
                    book_id: row.book_id,
                    text: row.content,
                    chapter_index: row.chapter_index,
                    page: row.page,
                    paragraph_index: row.paragraph_index,
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        debug!(book_id, returned = scored.len(), "retrieval query served");
        Ok(scored)
    }
}
