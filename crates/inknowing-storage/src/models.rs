// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for journal entities.
//!
//! The canonical dialogue types live in `inknowing-core::types`; this module
//! re-exports them and defines the rows only the journal itself knows about.

use serde::{Deserialize, Serialize};

pub use inknowing_core::types::{
    Book, Message, Persona, Reference, RetrievedChunk, Session,
};

/// One (user, period) budget row.
///
/// `consumed` may transiently exceed its committed value while a reservation
/// is outstanding; `0 <= consumed <= granted` holds at every observable
/// moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: String,
    pub user_id: String,
    pub period_kind: String,
    /// Inclusive start of the period, ISO 8601.
    pub period_start: String,
    pub granted: i64,
    pub consumed: i64,
    pub reset_at: String,
}

/// A journal write that failed after generation side effects.
///
/// Payload is the serialized turn; operators replay these offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub session_id: String,
    pub payload: String,
    pub reason: String,
    pub created_at: String,
}

/// Cached running summary of a session's trimmed history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub summary: String,
    /// Sequence number (exclusive) the summary covers.
    pub summarized_up_to: i64,
    pub updated_at: String,
}

/// A vector chunk row as stored, embedding still packed as a BLOB.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: String,
    pub book_id: String,
    pub chapter_index: Option<i64>,
    pub page: Option<i64>,
    pub paragraph_index: Option<i64>,
    pub content: String,
    pub embedding: Vec<u8>,
}
