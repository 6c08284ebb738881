// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible provider adapter for the InKnowing dialogue runtime.
//!
//! One adapter covers the `openai`, `qwen`, `baidu`, and `zhipu` provider
//! tags: all four speak the chat-completions wire shape, differing only in
//! endpoint and model names. Also implements [`EmbeddingAdapter`] over the
//! compatible embeddings endpoint.

pub mod client;
pub mod sse;
pub mod types;

use std::pin::Pin;

use async_trait::async_trait;
use inknowing_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, ProviderRequest,
    ProviderResponse, ProviderStreamChunk, TokenUsage,
};
use inknowing_core::{EmbeddingAdapter, InknowingError, PluginAdapter, ProviderAdapter};
use futures::Stream;
use tracing::debug;

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest, StreamOptions};

/// OpenAI-compatible provider implementing [`ProviderAdapter`] and
/// [`EmbeddingAdapter`].
pub struct OpenAiProvider {
    client: OpenAiClient,
    /// Provider tag this instance serves ("openai", "qwen", "baidu", "zhipu").
    tag: String,
    /// Model used by `embed` when this instance backs the embedding scenario.
    embedding_model: String,
}

impl OpenAiProvider {
    /// Creates a provider for one descriptor's credential and endpoint.
    pub fn new(tag: &str, api_key: &str, endpoint: Option<&str>) -> Result<Self, InknowingError> {
        Ok(Self {
            client: OpenAiClient::new(api_key, endpoint)?,
            tag: tag.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
        })
    }

    /// Overrides the embedding model name.
    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    fn to_chat_request(request: &ProviderRequest) -> ChatRequest {
        // The system prompt rides as the leading system message.
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        &self.tag
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
        debug!(tag = self.tag.as_str(), "provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, InknowingError> {
        let chat_request = Self::to_chat_request(&request);
        let response = self.client.complete_chat(&chat_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InknowingError::Provider {
                message: "response contained no choices".into(),
                source: None,
            })?;

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content,
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: response
                .usage
                .map(|u| TokenUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, InknowingError>> + Send>>,
        InknowingError,
    > {
        let chat_request = Self::to_chat_request(&request);
        self.client.stream_chat(&chat_request).await
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiProvider {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, InknowingError> {
        let response = self
            .client
            .embed(&EmbeddingRequest {
                model: self.embedding_model.clone(),
                input: input.texts,
            })
            .await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(EmbeddingOutput {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
        })
    }
}
