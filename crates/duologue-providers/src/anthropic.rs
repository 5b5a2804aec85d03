//! Anthropic Messages API adapter.
//!
//! System messages travel in the top-level `system` field, extended thinking
//! arrives as `thinking_delta` content blocks, and usage is split between
//! `message_start` (input) and `message_delta` (output).

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

use duologue_types::{Role, Vendor};

use crate::error::{Error, ErrorKind, Result};
use crate::sse::sse_chunk_stream;
use crate::traits::{ChatRequest, ChunkStream, Provider, ResponseChunk, TokenUsage};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the adapter at a different endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                Role::User => api_messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => api_messages.push(json!({
                    "role": "assistant",
                    "content": msg.content,
                })),
            }
        }

        let thinking_budget = request.thinking_budget.unwrap_or(4_096);
        // max_tokens must exceed the thinking budget or the API rejects
        let max_tokens = if request.thinking_enabled {
            request
                .max_tokens
                .unwrap_or(DEFAULT_MAX_TOKENS)
                .max(thinking_budget + 1_024)
        } else {
            request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
        };

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "stream": true,
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if request.thinking_enabled {
            body["thinking"] = json!({
                "type": "enabled",
                "budget_tokens": thinking_budget,
            });
        }

        body
    }
}

/// Map an Anthropic HTTP status plus error body `type` into the taxonomy
fn classify(status: StatusCode, error_type: &str, message: &str) -> ErrorKind {
    match error_type {
        "rate_limit_error" => return ErrorKind::RateLimit,
        "overloaded_error" => return ErrorKind::Overloaded,
        "authentication_error" | "permission_error" => return ErrorKind::Authentication,
        "billing_error" => return ErrorKind::Quota,
        "invalid_request_error" => {
            if message.contains("prompt is too long") || message.contains("context") {
                return ErrorKind::ContextLength;
            }
            return ErrorKind::InvalidRequest;
        }
        "timeout_error" => return ErrorKind::Timeout,
        "api_error" => return ErrorKind::ServerError,
        _ => {}
    }
    match status.as_u16() {
        401 | 403 => ErrorKind::Authentication,
        429 => ErrorKind::RateLimit,
        400 | 404 | 422 => ErrorKind::InvalidRequest,
        408 => ErrorKind::Timeout,
        529 => ErrorKind::Overloaded,
        _ if status.is_server_error() => ErrorKind::ServerError,
        _ => ErrorKind::InvalidRequest,
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let error_type = parsed
        .as_ref()
        .and_then(|v| v["error"]["type"].as_str())
        .unwrap_or("");
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .unwrap_or(&body)
        .to_string();

    Error::Api {
        vendor: Vendor::Anthropic.as_str().to_string(),
        kind: classify(status, error_type, &message),
        message: format!("HTTP {}: {}", status.as_u16(), message),
        retry_after,
    }
}

/// Per-stream state: input tokens arrive in message_start, output tokens in
/// message_delta, long before and after the text deltas respectively
#[derive(Default)]
struct StreamState {
    input_tokens: u64,
}

fn parse_sse(data: &str, state: &mut StreamState) -> Vec<Result<ResponseChunk>> {
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => return vec![Err(err.into())],
    };

    match value["type"].as_str().unwrap_or("") {
        "message_start" => {
            state.input_tokens = value["message"]["usage"]["input_tokens"]
                .as_u64()
                .unwrap_or(0);
            Vec::new()
        }
        "content_block_delta" => {
            let delta = &value["delta"];
            match delta["type"].as_str().unwrap_or("") {
                "text_delta" => match delta["text"].as_str() {
                    Some(text) if !text.is_empty() => vec![Ok(ResponseChunk::response(text))],
                    _ => Vec::new(),
                },
                "thinking_delta" => match delta["thinking"].as_str() {
                    Some(text) if !text.is_empty() => vec![Ok(ResponseChunk::thinking(text))],
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            }
        }
        "message_delta" => {
            // Final usage; delivered on an empty chunk the wrapper folds in
            match value["usage"]["output_tokens"].as_u64() {
                Some(output_tokens) => vec![Ok(ResponseChunk::response("").with_usage(
                    TokenUsage {
                        input_tokens: state.input_tokens,
                        output_tokens,
                    },
                ))],
                None => Vec::new(),
            }
        }
        "error" => {
            let error_type = value["error"]["type"].as_str().unwrap_or("");
            let message = value["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string();
            vec![Err(Error::api(
                Vendor::Anthropic.as_str(),
                classify(StatusCode::INTERNAL_SERVER_ERROR, error_type, &message),
                message,
            ))]
        }
        // ping, content_block_start/stop, message_stop
        _ => Vec::new(),
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let mut state = StreamState::default();
        Ok(sse_chunk_stream(response, move |data| {
            parse_sse(data, &mut state)
        }))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChunkKind, ProviderMessage};

    #[test]
    fn test_classify_table() {
        let s = StatusCode::from_u16;
        assert_eq!(
            classify(s(429).unwrap(), "rate_limit_error", ""),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify(s(529).unwrap(), "overloaded_error", ""),
            ErrorKind::Overloaded
        );
        assert_eq!(
            classify(s(401).unwrap(), "authentication_error", ""),
            ErrorKind::Authentication
        );
        assert_eq!(
            classify(s(400).unwrap(), "invalid_request_error", "prompt is too long: 250000 tokens"),
            ErrorKind::ContextLength
        );
        assert_eq!(
            classify(s(400).unwrap(), "invalid_request_error", "unknown parameter"),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            classify(s(500).unwrap(), "", ""),
            ErrorKind::ServerError
        );
    }

    #[test]
    fn test_system_messages_lift_to_system_field() {
        let provider = AnthropicProvider::new("claude-sonnet-4-20250514", "key").unwrap();
        let request = ChatRequest {
            messages: vec![
                ProviderMessage::new(Role::System, "Be brief."),
                ProviderMessage::new(Role::User, "hi"),
                ProviderMessage::new(Role::Assistant, "hello"),
            ],
            ..ChatRequest::default()
        };
        let body = provider.build_body(&request);
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_thinking_raises_max_tokens_above_budget() {
        let provider = AnthropicProvider::new("claude-sonnet-4-20250514", "key").unwrap();
        let request = ChatRequest {
            thinking_enabled: true,
            thinking_budget: Some(10_000),
            ..ChatRequest::default()
        };
        let body = provider.build_body(&request);
        assert_eq!(body["thinking"]["budget_tokens"], 10_000);
        assert!(body["max_tokens"].as_u64().unwrap() > 10_000);
    }

    #[test]
    fn test_parse_text_and_thinking_deltas() {
        let mut state = StreamState::default();

        let chunks = parse_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"let me see"}}"#,
            &mut state,
        );
        assert_eq!(chunks.len(), 1);
        let chunk = chunks.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.kind, ChunkKind::Thinking);
        assert_eq!(chunk.text, "let me see");

        let chunks = parse_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
            &mut state,
        );
        let chunk = chunks.into_iter().next().unwrap().unwrap();
        assert_eq!(chunk.kind, ChunkKind::Response);
        assert_eq!(chunk.text, "Hello");
    }

    #[test]
    fn test_usage_assembled_across_frames() {
        let mut state = StreamState::default();
        parse_sse(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":120}}}"#,
            &mut state,
        );
        let chunks = parse_sse(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":45}}"#,
            &mut state,
        );
        let usage = chunks.into_iter().next().unwrap().unwrap().usage.unwrap();
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 45);
    }

    #[test]
    fn test_stream_error_frame_maps_to_api_error() {
        let mut state = StreamState::default();
        let chunks = parse_sse(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &mut state,
        );
        let err = chunks.into_iter().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overloaded);
    }
}
