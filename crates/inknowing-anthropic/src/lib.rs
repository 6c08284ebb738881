// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for the InKnowing dialogue runtime.
//!
//! Implements [`ProviderAdapter`] for the Anthropic Messages API with
//! single-shot completion and streaming SSE responses.

pub mod client;
pub mod sse;
pub mod types;

use std::pin::Pin;

use async_trait::async_trait;
use inknowing_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    StreamEventType, TokenUsage,
};
use inknowing_core::{InknowingError, PluginAdapter, ProviderAdapter};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{ApiMessage, MessageRequest, ResponseContentBlock};

/// Default Anthropic API version header.
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider implementing [`ProviderAdapter`].
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    /// Creates a provider for one descriptor's credential and endpoint.
    pub fn new(api_key: &str, endpoint: Option<&str>) -> Result<Self, InknowingError> {
        let client = AnthropicClient::new(api_key, API_VERSION, endpoint)?;
        Ok(Self { client })
    }

    fn to_message_request(request: &ProviderRequest) -> MessageRequest {
        MessageRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            system: request.system_prompt.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: request.stream,
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, InknowingError> {
        // Health is tracked per-descriptor by the router from real call
        // outcomes; a standing API probe would burn tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), InknowingError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, InknowingError> {
        let api_request = Self::to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;

        let content = response
            .content
            .iter()
            .map(|block| match block {
                ResponseContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderResponse {
            id: response.id,
            content,
            model: response.model,
            stop_reason: response.stop_reason,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, InknowingError>> + Send>>,
        InknowingError,
    > {
        let api_request = Self::to_message_request(&request);
        let event_stream = self.client.stream_message(&api_request).await?;

        let mut stop_reason: Option<String> = None;
        let chunk_stream = event_stream.filter_map(move |result| {
            let chunk = match result {
                Ok(event) => map_stream_event(event, &mut stop_reason),
                Err(e) => Some(Err(e)),
            };
            async move { chunk }
        });

        Ok(Box::pin(chunk_stream))
    }
}

/// Maps an SSE [`StreamEvent`] to a normalized [`ProviderStreamChunk`].
///
/// The stop reason arrives on `message_delta` and is replayed on
/// `message_stop` so consumers see it on the terminal chunk.
fn map_stream_event(
    event: StreamEvent,
    stop_reason: &mut Option<String>,
) -> Option<Result<ProviderStreamChunk, InknowingError>> {
    match event {
        StreamEvent::MessageStart(ms) => Some(Ok(ProviderStreamChunk {
            event_type: StreamEventType::MessageStart,
            text: None,
            usage: Some(TokenUsage {
                input_tokens: ms.message.usage.input_tokens,
                output_tokens: ms.message.usage.output_tokens,
            }),
            stop_reason: None,
            error: None,
        })),
        StreamEvent::ContentBlockDelta(delta) => {
            let crate::types::SseDelta::TextDelta { text } = delta.delta;
            Some(Ok(ProviderStreamChunk {
                event_type: StreamEventType::ContentBlockDelta,
                text: Some(text),
                usage: None,
                stop_reason: None,
                error: None,
            }))
        }
        StreamEvent::MessageDelta(md) => {
            if let Some(ref reason) = md.delta.stop_reason {
                *stop_reason = Some(reason.clone());
            }
            Some(Ok(ProviderStreamChunk {
                event_type: StreamEventType::MessageDelta,
                text: None,
                usage: md.usage.map(|u| TokenUsage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                }),
                stop_reason: md.delta.stop_reason,
                error: None,
            }))
        }
        StreamEvent::MessageStop => Some(Ok(ProviderStreamChunk {
            event_type: StreamEventType::MessageStop,
            text: None,
            usage: None,
            stop_reason: stop_reason.clone(),
            error: None,
        })),
        StreamEvent::Error(err) => Some(Ok(ProviderStreamChunk {
            event_type: StreamEventType::Error,
            text: None,
            usage: None,
            stop_reason: None,
            error: Some(format!("{}: {}", err.error.type_, err.error.message)),
        })),
        StreamEvent::ContentBlockStart(_) | StreamEvent::ContentBlockStop(_) => None,
        StreamEvent::Ping => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inknowing_core::types::ProviderMessage;

    fn sample_request() -> ProviderRequest {
        ProviderRequest {
            model: "claude-sonnet-4-20250514".into(),
            system_prompt: Some("You are a book.".into()),
            messages: vec![ProviderMessage {
                role: "user".into(),
                content: "Summarize chapter 1".into(),
            }],
            max_tokens: 1024,
            temperature: Some(0.7),
            top_p: None,
            stream: true,
        }
    }

    #[test]
    fn request_conversion() {
        let api_req = AnthropicProvider::to_message_request(&sample_request());
        assert_eq!(api_req.model, "claude-sonnet-4-20250514");
        assert_eq!(api_req.system.as_deref(), Some("You are a book."));
        assert_eq!(api_req.messages.len(), 1);
        assert_eq!(api_req.messages[0].role, "user");
        assert_eq!(api_req.temperature, Some(0.7));
    }

    #[test]
    fn map_text_delta() {
        let mut stop = None;
        let event = StreamEvent::ContentBlockDelta(crate::types::SseContentBlockDelta {
            index: 0,
            delta: crate::types::SseDelta::TextDelta {
                text: "Hello".into(),
            },
        });
        let chunk = map_stream_event(event, &mut stop).unwrap().unwrap();
        assert_eq!(chunk.event_type, StreamEventType::ContentBlockDelta);
        assert_eq!(chunk.text.as_deref(), Some("Hello"));
    }

    #[test]
    fn map_message_stop_replays_stop_reason() {
        let mut stop = None;
        let delta_event = StreamEvent::MessageDelta(crate::types::SseMessageDelta {
            delta: crate::types::SseMessageDeltaInfo {
                stop_reason: Some("end_turn".into()),
            },
            usage: Some(crate::types::ApiUsage {
                input_tokens: 50,
                output_tokens: 30,
            }),
        });
        map_stream_event(delta_event, &mut stop).unwrap().unwrap();

        let stop_event = StreamEvent::MessageStop;
        let chunk = map_stream_event(stop_event, &mut stop).unwrap().unwrap();
        assert_eq!(chunk.event_type, StreamEventType::MessageStop);
        assert_eq!(chunk.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn map_ping_and_block_markers_to_none() {
        let mut stop = None;
        assert!(map_stream_event(StreamEvent::Ping, &mut stop).is_none());
        assert!(map_stream_event(
            StreamEvent::ContentBlockStart(crate::types::SseContentBlockStart { index: 0 }),
            &mut stop
        )
        .is_none());
        assert!(map_stream_event(
            StreamEvent::ContentBlockStop(crate::types::SseContentBlockStop { index: 0 }),
            &mut stop
        )
        .is_none());
    }

    #[test]
    fn map_error_event() {
        let mut stop = None;
        let event = StreamEvent::Error(crate::types::SseError {
            error: crate::types::ApiErrorDetail {
                type_: "overloaded_error".into(),
                message: "Overloaded".into(),
            },
        });
        let chunk = map_stream_event(event, &mut stop).unwrap().unwrap();
        assert_eq!(chunk.event_type, StreamEventType::Error);
        assert!(chunk.error.unwrap().contains("overloaded_error"));
    }
}
