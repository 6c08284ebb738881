// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` plays back a FIFO script of per-call behaviors, enabling
//! fast, CI-runnable tests of streaming, failover, and cancellation
//! without external API calls.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tokio::sync::Mutex;

use inknowing_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    StreamEventType, TokenUsage,
};
use inknowing_core::{InknowingError, PluginAdapter, ProviderAdapter};

/// What one `stream`/`complete` call should do.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Stream the text word by word, then a usage delta and message stop.
    Respond { text: String },
    /// Stream with a delay before each word (for cancellation tests).
    RespondSlowly { text: String, delay_ms: u64 },
    /// Fail before producing any chunk.
    FailImmediately { message: String },
    /// Emit `emit_words` words, then fail mid-stream.
    FailAfter { text: String, emit_words: usize },
}

/// A mock provider that pops behaviors from a FIFO script.
///
/// When the script is empty, calls behave as `Respond { "mock response" }`.
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<MockBehavior>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_script(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(behaviors))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: respond with each text in turn.
    pub fn with_responses(texts: Vec<&str>) -> Self {
        Self::with_script(
            texts
                .into_iter()
                .map(|t| MockBehavior::Respond {
                    text: t.to_string(),
                })
                .collect(),
        )
    }

    pub async fn push(&self, behavior: MockBehavior) {
        self.script.lock().await.push_back(behavior);
    }

    /// Number of stream/complete calls made so far.
    pub async fn call_count(&self) -> u32 {
        *self.calls.lock().await
    }

    async fn next_behavior(&self) -> MockBehavior {
        *self.calls.lock().await += 1;
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or(MockBehavior::Respond {
                text: "mock response".to_string(),
            })
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn delta(text: &str) -> Result<ProviderStreamChunk, InknowingError> {
    Ok(ProviderStreamChunk {
        event_type: StreamEventType::ContentBlockDelta,
        text: Some(text.to_string()),
        usage: None,
        stop_reason: None,
        error: None,
    })
}

fn usage_chunk(words: usize) -> Result<ProviderStreamChunk, InknowingError> {
    Ok(ProviderStreamChunk {
        event_type: StreamEventType::MessageDelta,
        text: None,
        usage: Some(TokenUsage {
            input_tokens: 10,
            output_tokens: words as u32,
        }),
        stop_reason: Some("end_turn".to_string()),
        error: None,
    })
}

fn stop_chunk() -> Result<ProviderStreamChunk, InknowingError> {
    Ok(ProviderStreamChunk {
        event_type: StreamEventType::MessageStop,
        text: None,
        usage: None,
        stop_reason: None,
        error: None,
    })
}

/// Split text into whitespace-preserving word deltas.
fn word_deltas(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split(' ').collect();
    words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i + 1 < words.len() {
                format!("{w} ")
            } else {
                (*w).to_string()
            }
        })
        .collect()
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, InknowingError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), InknowingError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, InknowingError> {
        match self.next_behavior().await {
            MockBehavior::Respond { text } | MockBehavior::RespondSlowly { text, .. } => {
                let words = text.split(' ').count();
                Ok(ProviderResponse {
                    id: format!("mock-{}", uuid::Uuid::new_v4()),
                    content: text,
                    model: request.model,
                    stop_reason: Some("end_turn".to_string()),
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: words as u32,
                    },
                })
            }
            MockBehavior::FailImmediately { message }
            | MockBehavior::FailAfter { text: message, .. } => Err(InknowingError::Provider {
                message,
                source: None,
            }),
        }
    }

    async fn stream(
        &self,
        _request: ProviderRequest,
    ) -> Result<
        Pin<
            Box<
                dyn futures_core::Stream<Item = Result<ProviderStreamChunk, InknowingError>>
                    + Send,
            >,
        >,
        InknowingError,
    > {
        match self.next_behavior().await {
            MockBehavior::Respond { text } => {
                let words = word_deltas(&text);
                let count = words.len();
                let mut chunks: Vec<Result<ProviderStreamChunk, InknowingError>> =
                    words.iter().map(|w| delta(w)).collect();
                chunks.push(usage_chunk(count));
                chunks.push(stop_chunk());
                Ok(Box::pin(stream::iter(chunks)))
            }
            MockBehavior::RespondSlowly { text, delay_ms } => {
                let words = word_deltas(&text);
                let count = words.len();
                let mut chunks: Vec<Result<ProviderStreamChunk, InknowingError>> =
                    words.iter().map(|w| delta(w)).collect();
                chunks.push(usage_chunk(count));
                chunks.push(stop_chunk());
                let delayed = stream::iter(chunks).then(move |chunk| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    chunk
                });
                Ok(Box::pin(delayed))
            }
            MockBehavior::FailImmediately { message } => Err(InknowingError::Provider {
                message,
                source: None,
            }),
            MockBehavior::FailAfter { text, emit_words } => {
                let words = word_deltas(&text);
                let mut chunks: Vec<Result<ProviderStreamChunk, InknowingError>> = words
                    .iter()
                    .take(emit_words)
                    .map(|w| delta(w))
                    .collect();
                chunks.push(Err(InknowingError::Provider {
                    message: "mock mid-stream failure".to_string(),
                    source: None,
                }));
                Ok(Box::pin(stream::iter(chunks)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "mock-model".into(),
            system_prompt: None,
            messages: vec![],
            max_tokens: 128,
            temperature: None,
            top_p: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn respond_streams_words_then_usage_then_stop() {
        let provider = MockProvider::with_responses(vec!["hello there reader"]);
        let mut stream = provider.stream(request()).await.unwrap();

        let mut text = String::new();
        let mut usage = None;
        let mut stopped = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            match chunk.event_type {
                StreamEventType::ContentBlockDelta => {
                    text.push_str(chunk.text.as_deref().unwrap())
                }
                StreamEventType::MessageDelta => usage = chunk.usage,
                StreamEventType::MessageStop => stopped = true,
                _ => {}
            }
        }
        assert_eq!(text, "hello there reader");
        assert_eq!(usage.unwrap().output_tokens, 3);
        assert!(stopped);
    }

    #[tokio::test]
    async fn fail_after_emits_then_errors() {
        let provider = MockProvider::with_script(vec![MockBehavior::FailAfter {
            text: "one two three four".into(),
            emit_words: 2,
        }]);
        let mut stream = provider.stream(request()).await.unwrap();

        let mut deltas = 0;
        let mut failed = false;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(c) if c.event_type == StreamEventType::ContentBlockDelta => deltas += 1,
                Ok(_) => {}
                Err(_) => failed = true,
            }
        }
        assert_eq!(deltas, 2);
        assert!(failed);
    }

    #[tokio::test]
    async fn fail_immediately_errors_before_stream() {
        let provider = MockProvider::with_script(vec![MockBehavior::FailImmediately {
            message: "forced outage".into(),
        }]);
        assert!(provider.stream(request()).await.is_err());
        assert_eq!(provider.call_count().await, 1);
    }

    #[tokio::test]
    async fn script_exhaustion_falls_back_to_default() {
        let provider = MockProvider::new();
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "mock response");
    }
}
