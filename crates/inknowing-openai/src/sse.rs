// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for OpenAI-compatible chat completions.
//!
//! The protocol is a sequence of `data: <json>` events terminated by a
//! literal `data: [DONE]`. Chunks are normalized straight into
//! [`ProviderStreamChunk`]s.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use inknowing_core::types::{ProviderStreamChunk, StreamEventType, TokenUsage};
use inknowing_core::InknowingError;

use crate::types::ChatStreamChunk;

/// Parses a reqwest streaming response into normalized provider chunks.
pub fn parse_chat_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, InknowingError>> + Send>> {
    let byte_stream = response.bytes_stream();
    let event_stream = byte_stream.eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                if event.data.trim() == "[DONE]" {
                    return Some(Ok(ProviderStreamChunk {
                        event_type: StreamEventType::MessageStop,
                        text: None,
                        usage: None,
                        stop_reason: None,
                        error: None,
                    }));
                }
                match serde_json::from_str::<ChatStreamChunk>(&event.data) {
                    Ok(chunk) => map_chunk(chunk).map(Ok),
                    Err(e) => Some(Err(InknowingError::Provider {
                        message: format!("failed to parse stream chunk: {e}"),
                        source: Some(Box::new(e)),
                    })),
                }
            }
            Err(e) => Some(Err(InknowingError::Provider {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}

fn map_chunk(chunk: ChatStreamChunk) -> Option<ProviderStreamChunk> {
    // Usage-only chunk (stream_options.include_usage) arrives with no choices.
    if chunk.choices.is_empty() {
        return chunk.usage.map(|u| ProviderStreamChunk {
            event_type: StreamEventType::MessageDelta,
            text: None,
            usage: Some(TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: None,
            error: None,
        });
    }

    let choice = &chunk.choices[0];
    if let Some(ref text) = choice.delta.content {
        if !text.is_empty() {
            return Some(ProviderStreamChunk {
                event_type: StreamEventType::ContentBlockDelta,
                text: Some(text.clone()),
                usage: None,
                stop_reason: None,
                error: None,
            });
        }
    }
    if let Some(ref reason) = choice.finish_reason {
        return Some(ProviderStreamChunk {
            event_type: StreamEventType::MessageDelta,
            text: None,
            usage: chunk.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: Some(reason.clone()),
            error: None,
        });
    }
    // Role-only or empty delta.
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;
        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn full_stream_sequence() {
        let sse = concat!(
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"c\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        );
        let mut stream = parse_chat_stream(mock_sse_response(sse).await);

        let mut text = String::new();
        let mut saw_stop_reason = false;
        let mut usage = None;
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            match chunk.event_type {
                StreamEventType::ContentBlockDelta => {
                    text.push_str(chunk.text.as_deref().unwrap_or(""));
                }
                StreamEventType::MessageDelta => {
                    if chunk.stop_reason.is_some() {
                        saw_stop_reason = true;
                    }
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                }
                StreamEventType::MessageStop => saw_done = true,
                _ => {}
            }
        }

        assert_eq!(text, "Hello");
        assert!(saw_stop_reason);
        assert_eq!(usage.unwrap().output_tokens, 2);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn malformed_chunk_surfaces_error() {
        let sse = "data: {not json}\n\n";
        let mut stream = parse_chat_stream(mock_sse_response(sse).await);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
