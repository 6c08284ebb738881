// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the dialogue runtime.
//!
//! Sessions, messages, and references mirror the journal schema. Provider
//! request/response types are the uniform shape every wire adapter speaks.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Storage,
    Retrieval,
}

/// Whether a session converses with a book or with one of its characters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Book,
    Character,
}

/// Session lifecycle state. A session is immutable once `Ended` or `Expired`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Expired,
}

/// Speaker role of a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Membership tiers; each maps to a quota policy row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Free,
    Basic,
    Premium,
    Super,
}

/// Quota accounting period.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Daily,
    Monthly,
}

/// A verified principal extracted from a bearer credential.
///
/// The runtime never sees more of the credential than this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub tier: MembershipTier,
}

/// A live or historical conversation between one user and one book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    /// Present iff `kind == Character`.
    pub character_id: Option<String>,
    pub kind: SessionKind,
    pub status: SessionStatus,
    /// Model identity of the most recent assistant turn.
    pub model_used: Option<String>,
    /// Denormalized running token total across all messages.
    pub total_tokens: i64,
    /// Denormalized running cost in USD.
    pub total_cost_usd: f64,
    pub created_at: String,
    pub last_activity_at: String,
    pub ended_at: Option<String>,
}

/// One persisted turn of speech. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    /// Position in the session's append-only sequence, starting at 0.
    /// User and assistant turns strictly alternate.
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    pub token_count: i64,
    /// Model that produced this message (assistant turns only).
    pub model_used: Option<String>,
    /// Wall-clock generation latency (assistant turns only).
    pub latency_ms: Option<i64>,
    /// True when generation was cancelled mid-stream and the text is a prefix.
    pub partial: bool,
    /// Error classification when the turn ended abnormally.
    pub error_kind: Option<String>,
    pub created_at: String,
}

/// Source kind of a citation attached to an assistant message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSource {
    Chapter,
    Page,
    Paragraph,
    Memory,
}

/// A citation attached to an assistant message. Written atomically with its
/// parent and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub message_id: String,
    pub source: ReferenceSource,
    pub chapter_index: Option<i64>,
    pub page: Option<i64>,
    pub paragraph_index: Option<i64>,
    pub memory_key: Option<String>,
    pub excerpt: String,
    /// Retrieval similarity in [0, 1].
    pub similarity: f64,
}

/// A chunk returned from the retrieval index, scored against a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub book_id: String,
    pub text: String,
    pub chapter_index: Option<i64>,
    pub page: Option<i64>,
    pub paragraph_index: Option<i64>,
    pub similarity: f64,
}

impl RetrievedChunk {
    /// Builds the citation row for this chunk under the given parent message.
    pub fn to_reference(&self, message_id: &str) -> Reference {
        let source = if self.paragraph_index.is_some() {
            ReferenceSource::Paragraph
        } else if self.page.is_some() {
            ReferenceSource::Page
        } else {
            ReferenceSource::Chapter
        };
        Reference {
            message_id: message_id.to_string(),
            source,
            chapter_index: self.chapter_index,
            page: self.page,
            paragraph_index: self.paragraph_index,
            memory_key: None,
            excerpt: self.text.clone(),
            similarity: self.similarity,
        }
    }
}

/// A book as the runtime sees it: a published conversation target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published: bool,
}

/// A book-scoped dialogue partner. Read-only to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub book_id: String,
    pub name: String,
    pub aliases: Vec<String>,
    /// System preamble establishing the character voice.
    pub preamble: String,
    /// Canon facts the character remembers about itself.
    pub memories: Vec<String>,
    /// Speech register (e.g. "formal", "colloquial").
    pub register: Option<String>,
    /// Baseline emotional tone.
    pub tone: Option<String>,
}

/// Token counts for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One message in a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

/// A request to an LLM provider, uniform across wire adapters.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stream: bool,
}

/// A full (non-streaming) response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Normalized streaming event type across provider wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    MessageStart,
    ContentBlockDelta,
    MessageDelta,
    MessageStop,
    Error,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
    pub error: Option<String>,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
}
