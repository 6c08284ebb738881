// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog fixtures and a deterministic embedder for cross-crate tests.

use std::sync::Arc;

use async_trait::async_trait;
use inknowing_core::types::{
    AdapterType, Book, EmbeddingInput, EmbeddingOutput, HealthStatus, Persona,
};
use inknowing_core::{EmbeddingAdapter, InknowingError, PluginAdapter};
use inknowing_retrieval::vec_to_blob;
use inknowing_storage::models::ChunkRow;
use inknowing_storage::{queries, Journal};

/// Embedding dimension used by fixtures.
pub const EMBED_DIM: usize = 8;

/// Deterministic embedder: hashes words into a small fixed-dimension
/// vector. Similar texts get similar vectors, which is all retrieval
/// tests need.
pub struct HashEmbedder;

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBED_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let mut h: u64 = 1469598103934665603;
        for b in word.bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(1099511628211);
        }
        v[(h % EMBED_DIM as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl PluginAdapter for HashEmbedder {
    fn name(&self) -> &str {
        "hash-embedder"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
    async fn health_check(&self) -> Result<HealthStatus, InknowingError> {
        Ok(HealthStatus::Healthy)
    }
    async fn shutdown(&self) -> Result<(), InknowingError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for HashEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, InknowingError> {
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| embed_text(t)).collect(),
        })
    }
}

/// A shareable hash embedder.
pub fn hash_embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder)
}

/// Seed the standard test catalog:
/// - book `b1` (published) with three chapter-1 chunks
/// - book `b2` (published) with character `c2` and one chunk
/// - book `b-draft` (unpublished)
pub async fn seed_catalog(journal: &Journal) -> Result<(), InknowingError> {
    let db = journal.database();

    queries::catalog::insert_book(
        db,
        &Book {
            id: "b1".into(),
            title: "To the Lighthouse".into(),
            author: Some("V. Woolf".into()),
            published: true,
        },
    )
    .await?;
    queries::catalog::insert_book(
        db,
        &Book {
            id: "b2".into(),
            title: "The Summer House".into(),
            author: None,
            published: true,
        },
    )
    .await?;
    queries::catalog::insert_book(
        db,
        &Book {
            id: "b-draft".into(),
            title: "Unfinished Draft".into(),
            author: None,
            published: false,
        },
    )
    .await?;

    queries::catalog::insert_persona(
        db,
        &Persona {
            id: "c2".into(),
            book_id: "b2".into(),
            name: "Mrs Ramsay".into(),
            aliases: vec!["the hostess".into()],
            preamble: "You speak as Mrs Ramsay, hostess of the summer house.".into(),
            memories: vec!["hosted the dinner party".into()],
            register: Some("formal".into()),
            tone: Some("warm".into()),
        },
    )
    .await?;

    let chunks = [
        ("b1-c1", "b1", 1, 1, "The lighthouse stood across the bay."),
        ("b1-c2", "b1", 1, 2, "Mrs Ramsay promised James a visit to the lighthouse."),
        ("b1-c3", "b1", 2, 1, "The dinner party gathered twenty around the table."),
        ("b2-c1", "b2", 1, 1, "The summer house opened its doors every June."),
    ];
    for (id, book_id, chapter, paragraph, content) in chunks {
        queries::catalog::insert_chunk(
            db,
            &ChunkRow {
                id: id.into(),
                book_id: book_id.into(),
                chapter_index: Some(chapter),
                page: None,
                paragraph_index: Some(paragraph),
                content: content.into(),
                embedding: vec_to_blob(&embed_text(content)),
            },
        )
        .await?;
    }

    Ok(())
}
