//! Google Gemini adapter over `streamGenerateContent` with SSE framing.
//!
//! Gemini has no system role on the wire; system messages become
//! `systemInstruction`, and the assistant role is called `model`. Thought
//! parts are flagged with `"thought": true` inside the candidate content.

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

use duologue_types::{Role, Vendor};

use crate::error::{Error, ErrorKind, Result};
use crate::sse::sse_chunk_stream;
use crate::traits::{ChatRequest, ChunkStream, Provider, ResponseChunk, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleProvider {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleProvider {
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

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut system_parts: Vec<Value> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(json!({ "text": msg.content })),
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": msg.content }],
                })),
                Role::Assistant => contents.push(json!({
                    "role": "model",
                    "parts": [{ "text": msg.content }],
                })),
            }
        }

        let mut generation_config = json!({});
        if let Some(temp) = request.temperature {
            generation_config["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if request.thinking_enabled {
            generation_config["thinkingConfig"] = json!({
                "thinkingBudget": request.thinking_budget.unwrap_or(4_096),
                "includeThoughts": true,
            });
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }

        body
    }
}

/// Map a Google status code plus error body `status` into the taxonomy
fn classify(status: StatusCode, grpc_status: &str, message: &str) -> ErrorKind {
    match grpc_status {
        "RESOURCE_EXHAUSTED" => {
            if message.contains("quota") {
                return ErrorKind::Quota;
            }
            return ErrorKind::RateLimit;
        }
        "UNAUTHENTICATED" | "PERMISSION_DENIED" => return ErrorKind::Authentication,
        "DEADLINE_EXCEEDED" => return ErrorKind::Timeout,
        "UNAVAILABLE" => return ErrorKind::Overloaded,
        "INVALID_ARGUMENT" => {
            if message.contains("token count") || message.contains("context") {
                return ErrorKind::ContextLength;
            }
            return ErrorKind::InvalidRequest;
        }
        _ => {}
    }
    match status.as_u16() {
        401 | 403 => ErrorKind::Authentication,
        429 => ErrorKind::RateLimit,
        400 | 404 => ErrorKind::InvalidRequest,
        503 => ErrorKind::Overloaded,
        504 => ErrorKind::Timeout,
        _ if status.is_server_error() => ErrorKind::ServerError,
        _ => ErrorKind::InvalidRequest,
    }
}

async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let grpc_status = parsed
        .as_ref()
        .and_then(|v| v["error"]["status"].as_str())
        .unwrap_or("");
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .unwrap_or(&body)
        .to_string();

    Error::Api {
        vendor: Vendor::Google.as_str().to_string(),
        kind: classify(status, grpc_status, &message),
        message: format!("HTTP {}: {}", status.as_u16(), message),
        retry_after: None,
    }
}

fn parse_sse(data: &str) -> Vec<Result<ResponseChunk>> {
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => return vec![Err(err.into())],
    };

    let mut chunks = Vec::new();

    if let Some(parts) = value["candidates"][0]["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str()
                && !text.is_empty()
            {
                if part["thought"].as_bool().unwrap_or(false) {
                    chunks.push(Ok(ResponseChunk::thinking(text)));
                } else {
                    chunks.push(Ok(ResponseChunk::response(text)));
                }
            }
        }
    }

    // Total usage arrives on the final generation frame
    if let Some(usage) = value.get("usageMetadata").filter(|u| u.is_object())
        && usage["candidatesTokenCount"].is_u64()
    {
        chunks.push(Ok(ResponseChunk::response("").with_usage(TokenUsage {
            input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0),
            output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
        })));
    }

    chunks
}

#[async_trait::async_trait]
impl Provider for GoogleProvider {
    async fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(sse_chunk_stream(response, parse_sse))
    }

    fn vendor(&self) -> Vendor {
        Vendor::Google
    }

    fn model(&self) -> &str {
        &self.model
    }
}
