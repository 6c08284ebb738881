// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns history plus retrieval into one bounded prompt.
//!
//! Budget rules: trailing history under `history_budget_tokens` (oldest
//! trimmed first), retrieval items above the similarity floor deduplicated
//! by (chapter, paragraph), and a final context-limit pass that drops
//! retrieval lowest-similarity-first, then older history. The preamble and
//! the newest utterance are never dropped.

use std::sync::Arc;

use inknowing_config::model::{ContextConfig, RetrievalConfig};
use inknowing_core::tokens::{count_message_tokens, count_tokens};
use inknowing_core::types::{Message, Persona, ProviderMessage, RetrievedChunk, Session};
use inknowing_core::{InknowingError, MessageRole, RetrievalIndex, SessionKind};
use tracing::debug;

use crate::persona::{affect_block, persona_preamble};
use crate::topics::discussed_topics;

/// Default book-mode preamble; character mode derives one from the persona.
const BOOK_PREAMBLE: &str = "You are the voice of the book \"{title}\". Answer from the \
book's actual content. When excerpts are provided, ground your answer in them and keep \
their citations accurate. If the book does not answer the question, say so.";

/// The assembled prompt for one turn.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    /// Trimmed history followed by the new utterance, oldest first.
    pub messages: Vec<ProviderMessage>,
    /// Retrieval items chosen for this turn, similarity descending. The
    /// session worker attaches these as references to the assistant reply.
    pub retrieved: Vec<RetrievedChunk>,
    pub prompt_tokens: usize,
    /// History messages dropped by the budget passes.
    pub trimmed_messages: usize,
}

/// Builds per-turn prompts from history, retrieval, and personas.
pub struct ContextAssembler {
    retrieval: Arc<dyn RetrievalIndex>,
    config: ContextConfig,
    retrieval_config: RetrievalConfig,
}

impl ContextAssembler {
    pub fn new(
        retrieval: Arc<dyn RetrievalIndex>,
        config: ContextConfig,
        retrieval_config: RetrievalConfig,
    ) -> Self {
        Self {
            retrieval,
            config,
            retrieval_config,
        }
    }

    /// Assemble the prompt for `utterance` against the given session state.
    ///
    /// `book_title` feeds the book-mode preamble; `summary` is the cached
    /// running summary, included when older history has been trimmed.
    pub async fn assemble(
        &self,
        session: &Session,
        book_title: &str,
        persona: Option<&Persona>,
        summary: Option<&str>,
        history: &[Message],
        utterance: &str,
        context_limit: usize,
    ) -> Result<AssembledPrompt, InknowingError> {
        // 1. Trailing history window under the history budget.
        let mut kept: Vec<&Message> = Vec::new();
        let mut used = 0usize;
        for message in history.iter().rev() {
            let cost = count_message_tokens(&message.content);
            if used + cost > self.config.history_budget_tokens {
                break;
            }
            used += cost;
            kept.push(message);
        }
        kept.reverse();
        let mut trimmed = history.len() - kept.len();

        // 2+3. Retrieval query: the new utterance plus the last two user turns.
        let query = retrieval_query(utterance, &kept);
        let neighbors = self
            .retrieval
            .top_k(
                &session.book_id,
                &query,
                self.retrieval_config.top_k,
                None,
            )
            .await?;

        // 4. Similarity floor and (chapter, paragraph) dedup.
        let mut retrieved: Vec<RetrievedChunk> = Vec::new();
        for chunk in neighbors {
            if chunk.similarity < self.retrieval_config.floor {
                continue;
            }
            let duplicate = retrieved.iter().any(|existing| {
                existing.chapter_index == chunk.chapter_index
                    && existing.paragraph_index == chunk.paragraph_index
            });
            if !duplicate {
                retrieved.push(chunk);
            }
        }

        // 5. Preamble (book or character), summary, excerpts.
        let preamble = match (session.kind, persona) {
            (SessionKind::Character, Some(persona)) => {
                let topics = discussed_topics(history, 5);
                format!(
                    "{}\n\n{}",
                    persona_preamble(persona),
                    affect_block(persona, &topics)
                )
            }
            _ => BOOK_PREAMBLE.replace("{title}", book_title),
        };
        let summary = summary.filter(|_| trimmed > 0);

        // 6. Context-limit pass: drop retrieval lowest-similarity-first,
        // then older history. Preamble and newest utterance survive.
        let reserve = self.config.context_reserve_tokens;
        loop {
            let system_prompt = build_system_prompt(&preamble, summary, &retrieved);
            let total = count_tokens(&system_prompt)
                + kept
                    .iter()
                    .map(|m| count_message_tokens(&m.content))
                    .sum::<usize>()
                + count_message_tokens(utterance);

            if total + reserve <= context_limit {
                let mut messages: Vec<ProviderMessage> = kept
                    .iter()
                    .map(|m| ProviderMessage {
                        role: provider_role(m.role),
                        content: m.content.clone(),
                    })
                    .collect();
                messages.push(ProviderMessage {
                    role: "user".to_string(),
                    content: utterance.to_string(),
                });

                debug!(
                    session_id = session.id.as_str(),
                    prompt_tokens = total,
                    retrieved = retrieved.len(),
                    trimmed,
                    "prompt assembled"
                );
                return Ok(AssembledPrompt {
                    system_prompt,
                    messages,
                    retrieved,
                    prompt_tokens: total,
                    trimmed_messages: trimmed,
                });
            }

            if let Some(last) = retrieved.pop() {
                debug!(chunk_id = last.chunk_id.as_str(), "dropped retrieval item for context limit");
                continue;
            }
            if !kept.is_empty() {
                kept.remove(0);
                trimmed += 1;
                continue;
            }
            // Nothing left to drop. The preamble plus utterance exceed the
            // model's window; surface as internal rather than truncating
            // the user's words.
            return Err(InknowingError::Internal(
                "prompt exceeds model context window after exhausting all trims".into(),
            ));
        }
    }
}

fn provider_role(role: MessageRole) -> String {
    match role {
        MessageRole::User => "user".to_string(),
        MessageRole::Assistant => "assistant".to_string(),
        MessageRole::System => "system".to_string(),
    }
}

/// The retrieval query is the new utterance plus the last two user turns.
fn retrieval_query(utterance: &str, kept: &[&Message]) -> String {
    let mut parts = vec![utterance.to_string()];
    parts.extend(
        kept.iter()
            .rev()
            .filter(|m| m.role == MessageRole::User)
            .take(2)
            .map(|m| m.content.clone()),
    );
    parts.join("\n")
}

/// Locator label for an excerpt, finest available granularity.
fn locator_label(chunk: &RetrievedChunk) -> String {
    match (chunk.chapter_index, chunk.page, chunk.paragraph_index) {
        (Some(ch), _, Some(para)) => format!("chapter {ch}, paragraph {para}"),
        (Some(ch), Some(page), None) => format!("chapter {ch}, page {page}"),
        (Some(ch), None, None) => format!("chapter {ch}"),
        (None, Some(page), _) => format!("page {page}"),
        _ => "excerpt".to_string(),
    }
}

fn build_system_prompt(
    preamble: &str,
    summary: Option<&str>,
    retrieved: &[RetrievedChunk],
) -> String {
    let mut sections = vec![preamble.to_string()];
    if let Some(summary) = summary {
        sections.push(format!("Conversation so far (summarized):\n{summary}"));
    }
    if !retrieved.is_empty() {
        let excerpts = retrieved
            .iter()
            .map(|c| format!("[{}] {}", locator_label(c), c.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        sections.push(format!("Relevant excerpts from the book:\n{excerpts}"));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use inknowing_core::types::{AdapterType, HealthStatus, SessionStatus};
    use inknowing_core::PluginAdapter;
    use std::sync::Mutex;

    struct FixedIndex {
        chunks: Vec<RetrievedChunk>,
        last_query: Mutex<String>,
    }

    impl FixedIndex {
        fn new(chunks: Vec<RetrievedChunk>) -> Self {
            Self {
                chunks,
                last_query: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for FixedIndex {
        fn name(&self) -> &str {
            "fixed-index"
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
    impl RetrievalIndex for FixedIndex {
        async fn top_k(
            &self,
            _book_id: &str,
            query: &str,
            k: usize,
            _chapter_range: Option<(i64, i64)>,
        ) -> Result<Vec<RetrievedChunk>, InknowingError> {
            *self.last_query.lock().unwrap() = query.to_string();
            Ok(self.chunks.iter().take(k).cloned().collect())
        }
    }

    fn chunk(id: &str, chapter: i64, paragraph: i64, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            book_id: "b1".to_string(),
            text: format!("excerpt {id}"),
            chapter_index: Some(chapter),
            page: None,
            paragraph_index: Some(paragraph),
            similarity,
        }
    }

    fn session(kind: SessionKind) -> Session {
        Session {
            id: "s1".into(),
            user_id: "u1".into(),
            book_id: "b1".into(),
            character_id: (kind == SessionKind::Character).then(|| "c1".to_string()),
            kind,
            status: SessionStatus::Active,
            model_used: None,
            total_tokens: 0,
            total_cost_usd: 0.0,
            created_at: "2026-03-01T10:00:00.000Z".into(),
            last_activity_at: "2026-03-01T10:00:00.000Z".into(),
            ended_at: None,
        }
    }

    fn message(seq: i64, role: MessageRole, content: &str) -> Message {
        Message {
            id: format!("m{seq}"),
            session_id: "s1".into(),
            seq,
            role,
            content: content.to_string(),
            token_count: 0,
            model_used: None,
            latency_ms: None,
            partial: false,
            error_kind: None,
            created_at: "2026-03-01T10:00:00.000Z".into(),
        }
    }

    fn assembler(chunks: Vec<RetrievedChunk>) -> (ContextAssembler, Arc<FixedIndex>) {
        let index = Arc::new(FixedIndex::new(chunks));
        (
            ContextAssembler::new(
                index.clone(),
                ContextConfig::default(),
                RetrievalConfig::default(),
            ),
            index,
        )
    }

    #[tokio::test]
    async fn excerpts_and_history_land_in_prompt() {
        let (assembler, _) = assembler(vec![chunk("c1", 1, 1, 0.9), chunk("c2", 2, 1, 0.6)]);
        let history = vec![
            message(0, MessageRole::User, "who is the hostess?"),
            message(1, MessageRole::Assistant, "Mrs Ramsay."),
        ];

        let prompt = assembler
            .assemble(
                &session(SessionKind::Book),
                "To the Lighthouse",
                None,
                None,
                &history,
                "what does she host?",
                100_000,
            )
            .await
            .unwrap();

        assert!(prompt.system_prompt.contains("To the Lighthouse"));
        assert!(prompt.system_prompt.contains("chapter 1, paragraph 1"));
        assert!(prompt.system_prompt.contains("excerpt c1"));
        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages.last().unwrap().content, "what does she host?");
        assert_eq!(prompt.retrieved.len(), 2);
        assert_eq!(prompt.trimmed_messages, 0);
    }

    #[tokio::test]
    async fn similarity_floor_and_dedup_apply() {
        let (assembler, _) = assembler(vec![
            chunk("keep", 1, 1, 0.9),
            chunk("dup", 1, 1, 0.8),
            chunk("floor", 2, 1, 0.2),
        ]);

        let prompt = assembler
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                None,
                &[],
                "question",
                100_000,
            )
            .await
            .unwrap();

        assert_eq!(prompt.retrieved.len(), 1);
        assert_eq!(prompt.retrieved[0].chunk_id, "keep");
    }

    #[tokio::test]
    async fn retrieval_query_includes_last_two_user_turns() {
        let (assembler, index) = assembler(vec![]);
        let history = vec![
            message(0, MessageRole::User, "first question"),
            message(1, MessageRole::Assistant, "answer one"),
            message(2, MessageRole::User, "second question"),
            message(3, MessageRole::Assistant, "answer two"),
            message(4, MessageRole::User, "third question"),
            message(5, MessageRole::Assistant, "answer three"),
        ];

        assembler
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                None,
                &history,
                "newest",
                100_000,
            )
            .await
            .unwrap();

        let query = index.last_query.lock().unwrap().clone();
        assert!(query.contains("newest"));
        assert!(query.contains("third question"));
        assert!(query.contains("second question"));
        assert!(!query.contains("first question"));
    }

    #[tokio::test]
    async fn history_budget_trims_oldest_first() {
        let index = Arc::new(FixedIndex::new(vec![]));
        let tight = ContextAssembler::new(
            index,
            ContextConfig {
                history_budget_tokens: 30,
                ..ContextConfig::default()
            },
            RetrievalConfig::default(),
        );

        let history: Vec<Message> = (0..10)
            .map(|i| {
                message(
                    i,
                    if i % 2 == 0 {
                        MessageRole::User
                    } else {
                        MessageRole::Assistant
                    },
                    &format!("message number {i} with several words in it"),
                )
            })
            .collect();

        let prompt = tight
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                None,
                &history,
                "latest",
                100_000,
            )
            .await
            .unwrap();

        assert!(prompt.trimmed_messages > 0);
        // Kept messages are the newest ones, in order.
        let first_kept = &prompt.messages[0].content;
        assert!(first_kept.contains("message number"));
        let kept_count = prompt.messages.len() - 1;
        assert_eq!(10 - prompt.trimmed_messages, kept_count);
    }

    #[tokio::test]
    async fn summary_included_only_when_trimmed() {
        let index = Arc::new(FixedIndex::new(vec![]));
        let tight = ContextAssembler::new(
            index,
            ContextConfig {
                history_budget_tokens: 20,
                ..ContextConfig::default()
            },
            RetrievalConfig::default(),
        );

        // No trimming: summary left out.
        let prompt = tight
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                Some("they discussed the lighthouse"),
                &[],
                "hello",
                100_000,
            )
            .await
            .unwrap();
        assert!(!prompt.system_prompt.contains("lighthouse"));

        // Trimming: summary prepended.
        let history: Vec<Message> = (0..8)
            .map(|i| message(i, MessageRole::User, "a fairly long message body here"))
            .collect();
        let prompt = tight
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                Some("they discussed the lighthouse"),
                &history,
                "hello",
                100_000,
            )
            .await
            .unwrap();
        assert!(prompt.system_prompt.contains("lighthouse"));
    }

    #[tokio::test]
    async fn context_limit_drops_retrieval_before_history() {
        let (assembler, _) = assembler(vec![
            chunk("high", 1, 1, 0.9),
            chunk("low", 2, 2, 0.5),
        ]);
        let history = vec![message(0, MessageRole::User, "short")];

        // Limit small enough to force dropping both retrieval items but
        // large enough to keep the single history message.
        let prompt = assembler
            .assemble(
                &session(SessionKind::Book),
                "Book",
                None,
                None,
                &history,
                "latest question",
                // Preamble ~60 tokens + reserve 512; leave a little room.
                620,
            )
            .await
            .unwrap();

        assert!(prompt.retrieved.len() < 2);
        assert_eq!(prompt.messages.last().unwrap().content, "latest question");
    }

    #[tokio::test]
    async fn character_session_uses_persona_preamble() {
        let (assembler, _) = assembler(vec![]);
        let persona = Persona {
            id: "c1".into(),
            book_id: "b1".into(),
            name: "Mrs Ramsay".into(),
            aliases: vec![],
            preamble: "You speak as Mrs Ramsay.".into(),
            memories: vec![],
            register: None,
            tone: Some("warm".into()),
        };

        let prompt = assembler
            .assemble(
                &session(SessionKind::Character),
                "Book",
                Some(&persona),
                None,
                &[],
                "how are you?",
                100_000,
            )
            .await
            .unwrap();

        assert!(prompt.system_prompt.contains("Mrs Ramsay"));
        assert!(prompt.system_prompt.contains("Current tone: warm"));
        assert!(!prompt.system_prompt.contains("voice of the book"));
    }
}
